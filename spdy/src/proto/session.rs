use bytes::Bytes;
use futures_util::io::{AsyncRead, AsyncWrite};
use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;
use std::{cmp, fmt};
use url::Url;

use super::streams::{
    Cancelled, Cause, Counts, Next, PushRegistry, PushState, Prioritize, Refused, RequestQueue,
    Store, Stream, StreamFrame, StreamKind,
};
use super::*;
use crate::builder::Builder;
use crate::codec::{Codec, HeaderBlock, HeaderCodec, UserError};
use crate::error::{Error, ProtocolError};
use crate::frame::{self, Frame, Reason, StreamId, StreamIdOverflow};
use crate::key::SessionKey;

pub(crate) type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// A client session multiplexing many streams over one transport.
///
/// The session is driven by [`poll`](Session::poll), which writes queued
/// frames and reads and dispatches incoming ones. Every other method only
/// updates state and queues frames, so all I/O happens inside `poll`.
///
/// Streams are addressed through [`StreamRef`] handles and observed with
/// [`poll_event`](Session::poll_event). Connection level happenings are
/// reported through [`poll_session_event`](Session::poll_session_event).
pub struct Session<T> {
    key: SessionKey,
    codec: Codec<T>,
    config: Config,
    availability: Availability,
    /// How the session ended, once it started draining.
    close_result: Option<Result<(), Error>>,

    store: Store,
    counts: Counts,
    requests: RequestQueue,
    pushes: PushRegistry,
    prioritize: Prioritize,

    send_flow: SendWindow,
    recv_flow: RecvWindow,
    /// The peer's INITIAL_WINDOW_SIZE, which seeds stream send windows.
    peer_initial_window_size: WindowSize,

    go_away: GoAway,
    ping_pong: PingPong,
    settings_cache: ServerSettingsCache,
    authorizer: Box<dyn PushAuthorizer>,
    clock: Clock,

    next_stream_id: Result<StreamId, StreamIdOverflow>,
    /// Highest id we assigned.
    last_stream_id: StreamId,
    /// Highest id the peer promised.
    last_push_id: StreamId,
    last_read: Instant,

    events: VecDeque<SessionEvent>,
    event_task: Option<Waker>,
}

/// Whether a session accepts new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// No new streams. Active streams run to completion.
    GoingAway,
    /// Nothing left to run; final writes are being flushed.
    Draining,
    Closed,
}

/// Result of [`Session::create_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStream {
    Ready(StreamRef),
    /// The concurrency limit is reached. Poll the request with
    /// [`Session::poll_request`].
    Pending(RequestId),
}

/// Connection level events.
#[derive(Debug, PartialEq)]
pub enum SessionEvent {
    GoAway {
        last_stream_id: StreamId,
        reason: Reason,
        debug_data: Bytes,
    },
    /// The peer's SETTINGS, after they were applied.
    Settings(frame::Settings),
    /// A pushed stream for this url can now be claimed.
    PushPromised(Url),
    Availability(Availability),
    /// Reported exactly once.
    Closed(Result<(), Error>),
}

impl Session<()> {
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        key: SessionKey,
        io: T,
        header_codec: Box<dyn HeaderCodec>,
        config: Config,
        settings_cache: ServerSettingsCache,
        authorizer: Box<dyn PushAuthorizer>,
        clock: Clock,
    ) -> Session<T> {
        let now = clock();

        let mut counts = Counts::new(&config);
        if let Some(val) = settings_cache.max_concurrent_streams(&key) {
            tracing::trace!("using remembered max_concurrent_streams={}", val);
            counts.apply_max_concurrent_streams(val);
        }

        let mut codec = Codec::new(io, header_codec);
        codec.set_max_recv_header_list_size(config.max_header_list_size);

        let mut session = Session {
            codec,
            availability: Availability::Available,
            close_result: None,
            store: Store::new(),
            counts,
            requests: RequestQueue::new(),
            pushes: PushRegistry::new(
                config.max_unclaimed_pushed_streams,
                config.pushed_stream_lifetime,
            ),
            prioritize: Prioritize::new(),
            send_flow: SendWindow::new(DEFAULT_INITIAL_WINDOW_SIZE),
            recv_flow: RecvWindow::new(config.session_max_recv_window, config.session_max_recv_window),
            peer_initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            go_away: GoAway::new(),
            ping_pong: PingPong::new(config.hung_interval, config.connection_at_risk_of_loss),
            settings_cache,
            authorizer,
            clock,
            next_stream_id: Ok(config.initial_stream_id),
            last_stream_id: StreamId::ZERO,
            last_push_id: StreamId::ZERO,
            last_read: now,
            events: VecDeque::new(),
            event_task: None,
            key,
            config,
        };

        session.send_initial_data();
        session
    }

    /// Queue the connection preface, our SETTINGS and, for a session
    /// window above the protocol default, the WINDOW_UPDATE that opens it.
    fn send_initial_data(&mut self) {
        self.codec.buffer_raw(frame::PREFACE);

        let mut settings = frame::Settings::default();
        settings.set_max_concurrent_streams(Some(self.config.max_concurrent_pushed_streams as u32));
        settings.set_initial_window_size(Some(self.config.initial_window_size));
        settings.set_max_header_list_size(Some(self.config.max_header_list_size as u32));
        if !self.config.enable_push {
            settings.set_enable_push(false);
        }
        self.prioritize.queue_control(settings.into());

        if self.config.session_max_recv_window > DEFAULT_INITIAL_WINDOW_SIZE {
            let delta = self.config.session_max_recv_window - DEFAULT_INITIAL_WINDOW_SIZE;
            self.prioritize
                .queue_control(frame::WindowUpdate::new(StreamId::ZERO, delta).into());
        }
    }

    // ===== Streams =====

    /// Create a stream, or queue the request if the concurrency limit is
    /// reached.
    pub fn create_stream(&mut self, url: Url, priority: Priority) -> Result<CreateStream, Error> {
        match self.availability {
            Availability::Available => {}
            Availability::GoingAway => return Err(Error::Aborted),
            Availability::Draining | Availability::Closed => return Err(Error::ConnectionClosed),
        }

        if self.counts.can_create_stream() {
            Ok(CreateStream::Ready(self.create_stream_now(url, priority)))
        } else {
            tracing::trace!(
                "concurrency limit reached; queueing request; max={}",
                self.counts.max_concurrent_streams()
            );
            Ok(CreateStream::Pending(self.requests.enqueue(priority, url)))
        }
    }

    fn create_stream_now(&mut self, url: Url, priority: Priority) -> StreamRef {
        let mut stream = Stream::new(
            url,
            priority,
            StreamKind::Request,
            self.peer_initial_window_size,
            self.config.initial_window_size,
        );
        self.counts.inc_num_created(&mut stream);

        let key = self.store.insert(stream);
        tracing::trace!(
            "create stream; priority={:?}; num_created={}",
            priority,
            self.counts.num_created()
        );
        key
    }

    /// Wait for a queued request to get its stream.
    pub fn poll_request(
        &mut self,
        id: RequestId,
        cx: &mut Context,
    ) -> Poll<Result<StreamRef, Error>> {
        self.requests.poll_result(id, cx)
    }

    /// Cancel a stream request. A stream already created for it is
    /// cancelled too, freeing its slot for the next queued request.
    ///
    /// Returns `false` if the request had failed, was already polled to
    /// completion, or is unknown.
    pub fn cancel_request(&mut self, id: RequestId) -> bool {
        match self.requests.cancel(id) {
            Cancelled::Queued => true,
            Cancelled::Served(key) => {
                tracing::trace!("cancel served stream request; id={:?}", id);
                let _ = self.cancel(key);
                true
            }
            Cancelled::Nothing => false,
        }
    }

    /// Serve queued requests while there is room.
    ///
    /// Each served request gets its stream before the next one is looked
    /// at, so the counters are always current.
    fn process_pending_requests(&mut self) {
        if self.availability != Availability::Available {
            return;
        }

        while self.counts.can_create_stream() {
            let (id, url, priority) = match self.requests.pop_next() {
                Some(next) => next,
                None => return,
            };

            let stream = self.create_stream_now(url, priority);
            self.requests.complete(id, Ok(stream));
        }
    }

    /// Queue the stream's HEADERS. The stream is activated, and gets its
    /// id, when the frame is written.
    pub fn send_headers(
        &mut self,
        key: StreamRef,
        block: HeaderBlock,
        end_stream: bool,
    ) -> Result<(), Error> {
        self.ensure_open()?;

        let stream = self.live_stream(key)?;
        stream.state.send_open(end_stream)?;
        let priority = stream.priority;

        self.prioritize
            .queue_frame(key, priority, StreamFrame::Headers { block, end_stream });

        let now = self.now();
        if self.ping_pong.should_send_preface_ping(now, self.last_read) {
            let ping = self.ping_pong.send_ping(now);
            self.prioritize.queue_control(ping.into());
        }

        Ok(())
    }

    /// Queue body bytes. They are framed as send credit allows.
    pub fn send_data(&mut self, key: StreamRef, data: Bytes, end_stream: bool) -> Result<(), Error> {
        self.ensure_open()?;

        let stream = self.live_stream(key)?;
        if stream.state.is_idle() {
            return Err(UserError::HeadersNotSent.into());
        }
        if !stream.state.is_send_streaming() || stream.pending_send_eos {
            return Err(UserError::SendAfterEndStream.into());
        }

        stream.buffer_send(data, end_stream);
        self.send_stream_data(key);
        Ok(())
    }

    /// Turn buffered body bytes into DATA frames.
    ///
    /// Each frame takes credit from both windows. A stream that runs out of
    /// stream credit waits for a stream WINDOW_UPDATE. One that runs out of
    /// session credit joins the session stall queue.
    fn send_stream_data(&mut self, key: StreamRef) {
        let max_chunk = cmp::min(self.config.max_send_chunk, self.codec.max_send_frame_size());

        loop {
            let stream = match self.store.get_mut(key) {
                Some(stream) if !stream.is_detached => stream,
                _ => return,
            };

            if !stream.has_pending_send() {
                return;
            }

            let eos_only = stream.buffered_send_data == 0;
            if !eos_only {
                if stream.send_flow.is_stalled() {
                    tracing::trace!("stalled on stream window; stream={:?}", stream.id);
                    stream.is_stalled_by_stream = true;
                    return;
                }

                if self.send_flow.is_stalled() {
                    tracing::trace!("stalled on session window; stream={:?}", stream.id);
                    if !stream.is_stalled_by_session {
                        stream.is_stalled_by_session = true;
                        self.prioritize.stall(key, stream.priority);
                    }
                    return;
                }
            }

            let available = cmp::min(stream.send_flow.available(), self.send_flow.available());
            let payload = if eos_only {
                Bytes::new()
            } else {
                stream.take_send_chunk(cmp::min(max_chunk, available as usize))
            };

            let len = payload.len() as WindowSize;
            stream.send_flow.dec_window(len);
            self.send_flow.dec_window(len);

            let end_stream = stream.pending_send_eos && stream.buffered_send_data == 0;
            if end_stream {
                stream.end_stream_queued = true;
            }

            self.prioritize
                .queue_frame(key, stream.priority, StreamFrame::Data { payload, end_stream });
        }
    }

    /// Hand out session credit to stalled streams, highest priority first.
    fn resume_session_stalled(&mut self) {
        while !self.send_flow.is_stalled() {
            let key = match self.prioritize.pop_stalled() {
                Some(key) => key,
                None => return,
            };

            match self.store.get_mut(key) {
                Some(stream) => stream.is_stalled_by_session = false,
                None => continue,
            }

            self.send_stream_data(key);
        }
    }

    /// Next event for the stream. `None` once the stream is gone.
    ///
    /// The stream's slot is released when `Closed` is returned.
    pub fn poll_event(&mut self, key: StreamRef, cx: &mut Context) -> Poll<Option<StreamEvent>> {
        let stream = match self.store.get_mut(key) {
            Some(stream) => stream,
            None => return Poll::Ready(None),
        };

        match stream.poll_event(cx) {
            Some(StreamEvent::Closed(result)) => {
                self.store.remove(key);
                Poll::Ready(Some(StreamEvent::Closed(result)))
            }
            Some(event) => Poll::Ready(Some(event)),
            None => Poll::Pending,
        }
    }

    /// Hand `sz` received bytes back to the peer's send credit.
    pub fn release_capacity(&mut self, key: StreamRef, sz: usize) -> Result<(), Error> {
        let stream = self.store.get_mut(key).ok_or(Error::StreamClosed)?;

        // credit of a closed stream was returned when it closed
        if stream.is_detached {
            return Ok(());
        }

        if sz > stream.in_flight_recv_data as usize {
            return Err(UserError::ReleaseCapacityTooBig.into());
        }

        let sz = sz as WindowSize;
        stream.in_flight_recv_data -= sz;

        let update = if stream.state.is_recv_streaming() {
            stream.recv_flow.inc_window(sz)
        } else {
            None
        };
        let id = stream.id;

        if let Some(increment) = update {
            self.prioritize
                .queue_control(frame::WindowUpdate::new(id, increment).into());
        }

        self.release_session_capacity(sz);
        Ok(())
    }

    fn release_session_capacity(&mut self, sz: WindowSize) {
        if sz == 0 {
            return;
        }

        if let Some(increment) = self.recv_flow.inc_window(sz) {
            self.prioritize
                .queue_control(frame::WindowUpdate::new(StreamId::ZERO, increment).into());
        }
    }

    /// Cancel the stream and release its handle.
    pub fn cancel(&mut self, key: StreamRef) -> Result<(), Error> {
        self.reset(key, Reason::CANCEL)
    }

    /// Reset the stream with `reason` and release its handle.
    pub fn reset(&mut self, key: StreamRef, reason: Reason) -> Result<(), Error> {
        if !self.store.contains(key) {
            return Err(Error::StreamClosed);
        }

        self.reset_stream(key, reason, Err(Error::Aborted));
        self.store.remove(key);
        Ok(())
    }

    /// Close the stream without telling the peer and release its handle.
    pub fn close(&mut self, key: StreamRef) -> Result<(), Error> {
        if !self.store.contains(key) {
            return Err(Error::StreamClosed);
        }

        self.close_stream(key, Ok(()), Cause::LocallyReset(Reason::NO_ERROR));
        self.store.remove(key);
        Ok(())
    }

    /// Claim a pushed stream. Its buffered events are delivered through
    /// `poll_event` as for any other stream.
    pub fn claim_pushed_stream(&mut self, url: &Url) -> Option<StreamRef> {
        let now = self.now();
        self.expire_pushed_streams(now);

        let key = self.pushes.claim(url, now)?;
        if let Some(stream) = self.store.get_mut(key) {
            if let Some(ref mut push) = stream.push {
                push.claimed = true;
            }
            tracing::trace!("claimed pushed stream; stream={:?}; url={}", stream.id, url);
        }

        Some(key)
    }

    fn live_stream(&mut self, key: StreamRef) -> Result<&mut Stream, Error> {
        match self.store.get_mut(key) {
            Some(stream) if !stream.is_detached => Ok(stream),
            _ => Err(Error::StreamClosed),
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.availability {
            Availability::Available | Availability::GoingAway => Ok(()),
            _ => Err(Error::ConnectionClosed),
        }
    }

    // ===== Stream teardown =====

    /// Send RST_STREAM if the peer knows the stream, then close it.
    fn reset_stream(&mut self, key: StreamRef, reason: Reason, result: Result<(), Error>) {
        let stream = match self.store.get(key) {
            Some(stream) if !stream.is_detached => stream,
            _ => return,
        };

        // ids are assigned as HEADERS are written, so an id means the peer
        // has seen the stream
        if !stream.id.is_zero() && !stream.state.is_closed() {
            tracing::trace!("reset stream; stream={:?}; reason={:?}", stream.id, reason);
            self.prioritize
                .queue_control(frame::Reset::new(stream.id, reason).into());
        }

        self.close_stream(key, result, Cause::LocallyReset(reason));
    }

    /// Detach a stream from the session and queue its final event.
    ///
    /// Counters, queues and windows are settled before the owner is
    /// notified, and any request unblocked by the freed slot is served
    /// before returning.
    fn close_stream(&mut self, key: StreamRef, result: Result<(), Error>, cause: Cause) {
        let stream = match self.store.get_mut(key) {
            Some(stream) if !stream.is_detached => stream,
            _ => return,
        };

        tracing::trace!(
            "close stream; stream={:?}; cause={:?}; result={:?}",
            stream.id,
            cause,
            result
        );

        stream.state.set_reset(cause);
        stream.is_detached = true;
        stream.is_stalled_by_stream = false;
        stream.is_stalled_by_session = false;
        stream.clear_send();
        self.counts.dec_num_streams(stream);

        let unreleased = std::mem::replace(&mut stream.in_flight_recv_data, 0);
        let id = stream.id;
        let priority = stream.priority;
        let url = stream.url.clone();
        let is_unclaimed_push = stream.is_unclaimed_push();
        let is_ok = result.is_ok();

        stream.push_event(StreamEvent::Closed(result));

        let removed = self.prioritize.remove_for_stream(key, priority);
        if removed.headers {
            tracing::trace!("closed before HEADERS were written; url={}", url);
        }
        self.send_flow.return_window(removed.data as WindowSize);
        self.prioritize.remove_stalled(key, priority);

        if !id.is_zero() {
            self.store.remove_id(id);
        }

        self.release_session_capacity(unreleased);

        // a completed push stays claimable, anything else nobody will
        // ever read
        if is_unclaimed_push && !is_ok {
            self.pushes.remove(&url, key);
            self.store.remove(key);
        }

        self.process_pending_requests();
        self.maybe_finish_going_away();
    }

    /// Reset an unclaimed push and drop it.
    fn discard_push(&mut self, key: StreamRef, reason: Reason) {
        self.reset_stream(key, reason, Err(Error::Aborted));
        self.store.remove(key);
    }

    fn expire_pushed_streams(&mut self, now: Instant) {
        for key in self.pushes.expire(now) {
            self.discard_push(key, Reason::CANCEL);
        }
    }

    // ===== Driving =====

    /// Drive the session: flush queued frames and read and dispatch
    /// incoming ones.
    ///
    /// Resolves once the session is closed, with `Ok` for an orderly close
    /// and the error that closed it otherwise.
    pub fn poll(&mut self, cx: &mut Context) -> Poll<Result<(), Error>> {
        let span = tracing::trace_span!("Session::poll", key = %self.key);
        let _e = span.enter();

        loop {
            match self.availability {
                Availability::Available | Availability::GoingAway => {
                    let now = self.now();
                    self.expire_pushed_streams(now);

                    if self.check_ping_status().is_err() {
                        continue;
                    }

                    if let Poll::Ready(Err(err)) = self.poll_write(cx) {
                        self.close_on_error(err);
                        continue;
                    }

                    match self.poll_read(cx) {
                        Poll::Ready(Ok(())) => continue,
                        Poll::Ready(Err(err)) => {
                            self.close_on_error(err);
                            continue;
                        }
                        Poll::Pending => {}
                    }

                    // frames queued while reading
                    if let Poll::Ready(Err(err)) = self.poll_write(cx) {
                        self.close_on_error(err);
                        continue;
                    }

                    return Poll::Pending;
                }
                Availability::Draining => {
                    // final writes are best effort
                    if let Err(err) = ready!(self.poll_write(cx)) {
                        tracing::debug!("write failed while draining; err={:?}", err);
                    }
                    if let Err(err) = ready!(self.codec.poll_close(cx)) {
                        tracing::debug!("transport close failed; err={:?}", err);
                    }

                    let result = self.close_result.clone().unwrap_or(Ok(()));
                    tracing::debug!("session closed; result={:?}", result);
                    self.set_availability(Availability::Closed);
                    self.push_event(SessionEvent::Closed(result));
                }
                Availability::Closed => {
                    return Poll::Ready(self.close_result.clone().unwrap_or(Ok(())));
                }
            }
        }
    }

    /// Write queued frames until the queue is empty or the transport
    /// pushes back.
    fn poll_write(&mut self, cx: &mut Context) -> Poll<Result<(), Error>> {
        loop {
            if self.codec.has_pending_writes() {
                ready!(self.codec.poll_flush(cx))?;
            }

            if !self.buffer_next()? {
                return Poll::Ready(Ok(()));
            }
        }
    }

    fn buffer_next(&mut self) -> Result<bool, Error> {
        match self.prioritize.pop_frame() {
            Some(Next::Control(frame)) => self.codec.buffer(frame)?,
            Some(Next::Stream(key, frame)) => self.buffer_stream_frame(key, frame)?,
            None => return Ok(false),
        }

        Ok(true)
    }

    fn buffer_stream_frame(&mut self, key: StreamRef, frame: StreamFrame) -> Result<(), Error> {
        let id = match self.store.get(key) {
            Some(stream) if !stream.is_detached => stream.id,
            _ => return Ok(()),
        };

        match frame {
            StreamFrame::Headers { block, end_stream } => {
                let id = if id.is_zero() {
                    self.activate_stream(key)?
                } else {
                    id
                };

                let mut frame = frame::Headers::new(id, block);
                if end_stream {
                    frame.set_end_stream();
                }
                self.codec.buffer(frame.into())?;

                if id == StreamId::MAX {
                    tracing::debug!("stream id space exhausted");
                    self.start_going_away(StreamId::MAX, Error::Aborted);
                }
            }
            StreamFrame::Data {
                payload,
                end_stream,
            } => {
                debug_assert!(!id.is_zero());

                let mut frame = frame::Data::new(id, payload);
                frame.set_end_stream(end_stream);
                self.codec.buffer(frame.into())?;

                if end_stream {
                    let closed = match self.store.get_mut(key) {
                        Some(stream) => {
                            stream.state.send_close();
                            stream.state.is_closed()
                        }
                        None => false,
                    };

                    if closed {
                        self.close_stream(key, Ok(()), Cause::EndStream);
                    }
                }
            }
        }

        Ok(())
    }

    /// Give the stream the next id and move it from created to active.
    fn activate_stream(&mut self, key: StreamRef) -> Result<StreamId, Error> {
        let id = match self.next_stream_id {
            Ok(id) => id,
            Err(_) => return Err(UserError::OverflowedStreamId.into()),
        };

        let stream = self.store.get_mut(key).ok_or(Error::StreamClosed)?;
        self.counts.activate(stream);
        self.store.set_id(key, id);

        self.next_stream_id = id.next_id();
        self.last_stream_id = id;

        tracing::trace!(
            "activate stream; id={:?}; num_active={}",
            id,
            self.counts.num_active()
        );
        Ok(id)
    }

    /// Read and dispatch frames.
    ///
    /// Yields back to the executor once enough bytes have been read or
    /// enough time has passed, even if more frames are ready.
    fn poll_read(&mut self, cx: &mut Context) -> Poll<Result<(), Error>> {
        let start = self.now();
        let mut bytes_read = 0;

        loop {
            match ready!(self.codec.poll_next(cx)) {
                Some(Ok(frame)) => {
                    bytes_read += self.codec.last_frame_len();
                    self.last_read = self.now();
                    self.recv_frame(frame)?;
                }
                Some(Err(err)) => return Poll::Ready(Err(err.into())),
                None => {
                    tracing::debug!("transport closed by peer");
                    return Poll::Ready(Err(Error::ConnectionClosed));
                }
            }

            match self.availability {
                Availability::Available | Availability::GoingAway => {}
                _ => return Poll::Ready(Ok(())),
            }

            let elapsed = self.now().saturating_duration_since(start);
            if bytes_read >= self.config.yield_after_bytes
                || elapsed >= self.config.yield_after_duration
            {
                tracing::trace!(
                    "yielding read loop; bytes_read={}; elapsed={:?}",
                    bytes_read,
                    elapsed
                );
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
    }

    // ===== Frame dispatch =====

    fn recv_frame(&mut self, frame: Frame) -> Result<(), Error> {
        tracing::trace!("recv frame; frame={:?}", frame);

        match frame {
            Frame::Data(frame) => self.recv_data(frame),
            Frame::Headers(frame) => self.recv_headers(frame),
            Frame::PushPromise(frame) => self.recv_push_promise(frame),
            Frame::Settings(frame) => self.recv_settings(frame),
            Frame::Ping(frame) => self.recv_ping(frame),
            Frame::GoAway(frame) => {
                self.recv_go_away(frame);
                Ok(())
            }
            Frame::WindowUpdate(frame) => self.recv_window_update(frame),
            Frame::Reset(frame) => self.recv_reset(frame),
            Frame::Unknown(head) => self.recv_unknown(head),
        }
    }

    /// Whether `id` is beyond anything opened on this session so far.
    fn is_idle_stream(&self, id: StreamId) -> bool {
        if id.is_client_initiated() {
            id > self.last_stream_id
        } else if id.is_server_initiated() {
            id > self.last_push_id
        } else {
            false
        }
    }

    /// A frame for a stream that is not (or no longer) open.
    fn recv_for_missing_stream(&mut self, id: StreamId, kind: &str) {
        if self.is_idle_stream(id) {
            proto_err!(stream: "{} on idle stream; id={:?}", kind, id);
            self.prioritize
                .queue_control(frame::Reset::new(id, Reason::PROTOCOL_ERROR).into());
        } else {
            tracing::trace!("ignoring {} for closed stream; id={:?}", kind, id);
        }
    }

    fn recv_data(&mut self, frame: frame::Data) -> Result<(), Error> {
        let id = frame.stream_id();
        let flow_len = frame.flow_len() as WindowSize;

        if self.recv_flow.dec_window(flow_len).is_err() {
            proto_err!(conn: "DATA exceeds session receive window; id={:?}; len={}", id, flow_len);
            return Err(Error::FlowControl);
        }

        let key = match self.store.find_by_id(id) {
            Some(key) => key,
            None => {
                self.release_session_capacity(flow_len);
                self.recv_for_missing_stream(id, "DATA");
                return Ok(());
            }
        };

        let stream = match self.store.get_mut(key) {
            Some(stream) => stream,
            None => return Ok(()),
        };

        if !stream.state.is_recv_streaming() {
            proto_err!(stream: "unexpected DATA; id={:?}; state={:?}", id, stream.state);
            let reason = if stream.state.is_remote_closed() {
                Reason::STREAM_CLOSED
            } else {
                Reason::PROTOCOL_ERROR
            };
            self.release_session_capacity(flow_len);
            self.reset_stream(
                key,
                reason,
                Err(Error::Protocol(ProtocolError::UnexpectedFrame)),
            );
            return Ok(());
        }

        if stream.recv_flow.dec_window(flow_len).is_err() {
            proto_err!(stream: "DATA exceeds stream receive window; id={:?}; len={}", id, flow_len);
            self.release_session_capacity(flow_len);
            self.reset_stream(key, Reason::FLOW_CONTROL_ERROR, Err(Error::FlowControl));
            return Ok(());
        }

        let end_stream = frame.is_end_stream();
        let payload = frame.into_payload();
        // pad length byte and padding are never handed to the owner
        let padding = flow_len - payload.len() as WindowSize;

        stream.in_flight_recv_data += payload.len() as WindowSize;
        let stream_update = if padding > 0 && !end_stream {
            stream.recv_flow.inc_window(padding)
        } else {
            None
        };

        if !payload.is_empty() {
            stream.push_event(StreamEvent::Data(payload));
        }

        let mut closed = false;
        if end_stream {
            stream.state.recv_close()?;
            closed = stream.state.is_closed();
        }

        if let Some(increment) = stream_update {
            self.prioritize
                .queue_control(frame::WindowUpdate::new(id, increment).into());
        }
        self.release_session_capacity(padding);

        if closed {
            self.close_stream(key, Ok(()), Cause::EndStream);
        }

        Ok(())
    }

    fn recv_headers(&mut self, frame: frame::Headers) -> Result<(), Error> {
        let id = frame.stream_id();

        let key = match self.store.find_by_id(id) {
            Some(key) => key,
            None => {
                self.recv_for_missing_stream(id, "HEADERS");
                return Ok(());
            }
        };

        let end_stream = frame.is_end_stream();
        let block = frame.into_block();

        let stream = match self.store.get_mut(key) {
            Some(stream) => stream,
            None => return Ok(()),
        };

        if stream.state.is_recv_headers() {
            if stream.state.is_reserved_remote() {
                if !self.counts.can_inc_num_active_pushed() {
                    tracing::debug!("push limit reached; refusing pushed stream; id={:?}", id);
                    self.reset_stream(key, Reason::REFUSED_STREAM, Err(Error::StreamRefused));
                    return Ok(());
                }
                self.counts.inc_num_active_pushed(stream);
            }

            stream.state.recv_open(end_stream)?;
            stream.push_event(StreamEvent::Headers(block));
        } else if stream.state.is_recv_streaming() {
            if !end_stream {
                proto_err!(stream: "trailers without END_STREAM; id={:?}", id);
                self.reset_stream(
                    key,
                    Reason::PROTOCOL_ERROR,
                    Err(Error::Protocol(ProtocolError::UnexpectedFrame)),
                );
                return Ok(());
            }

            stream.state.recv_close()?;
            stream.push_event(StreamEvent::Trailers(block));
        } else {
            proto_err!(stream: "unexpected HEADERS; id={:?}; state={:?}", id, stream.state);
            self.reset_stream(
                key,
                Reason::STREAM_CLOSED,
                Err(Error::Protocol(ProtocolError::UnexpectedFrame)),
            );
            return Ok(());
        }

        if stream.state.is_closed() {
            self.close_stream(key, Ok(()), Cause::EndStream);
        }

        Ok(())
    }

    fn recv_push_promise(&mut self, frame: frame::PushPromise) -> Result<(), Error> {
        let associated_id = frame.stream_id();
        let promised_id = frame.promised_id();

        if promised_id <= self.last_push_id {
            proto_err!(conn: "PUSH_PROMISE id did not increase; promised={:?}; last={:?}", promised_id, self.last_push_id);
            return Err(Error::Protocol(ProtocolError::InvalidPush));
        }
        self.last_push_id = promised_id;

        let url = match self.admit_push(associated_id, frame.block()) {
            Some(url) => url,
            None => {
                self.prioritize
                    .queue_control(frame::Reset::new(promised_id, Reason::REFUSED_STREAM).into());
                return Ok(());
            }
        };

        let now = self.now();
        let priority = self
            .store
            .find_by_id(associated_id)
            .and_then(|key| self.store.get(key))
            .map(|stream| stream.priority)
            .unwrap_or_default();

        let mut stream = Stream::new(
            url.clone(),
            priority,
            StreamKind::Pushed,
            self.peer_initial_window_size,
            self.config.initial_window_size,
        );
        stream.state.reserve_remote()?;
        stream.push = Some(PushState {
            associated_id,
            promised_at: now,
            claimed: false,
        });
        self.counts.inc_num_pushed(&mut stream);

        let key = self.store.insert(stream);
        self.store.set_id(key, promised_id);

        tracing::trace!("accepted push; id={:?}; url={}", promised_id, url);

        match self.pushes.register(url.clone(), key, now) {
            Ok(None) => {}
            Ok(Some(evicted)) => self.discard_push(evicted, Reason::REFUSED_STREAM),
            Err(Refused::Duplicate) => {
                self.discard_push(key, Reason::REFUSED_STREAM);
                return Ok(());
            }
        }

        self.push_event(SessionEvent::PushPromised(url));
        Ok(())
    }

    /// The pushed url, if the push may be accepted.
    fn admit_push(&self, associated_id: StreamId, block: &HeaderBlock) -> Option<Url> {
        if !self.config.enable_push {
            tracing::debug!("refusing push; push disabled");
            return None;
        }

        if self.availability != Availability::Available {
            tracing::debug!("refusing push; session going away");
            return None;
        }

        let associated = match self
            .store
            .find_by_id(associated_id)
            .and_then(|key| self.store.get(key))
        {
            Some(stream) if !stream.is_pushed() && !stream.state.is_remote_closed() => stream,
            _ => {
                tracing::debug!("refusing push; associated stream not open; id={:?}", associated_id);
                return None;
            }
        };

        let url = match block.url() {
            Some(url) => url,
            None => {
                tracing::debug!("refusing push; no url in promise");
                return None;
            }
        };

        if !self
            .authorizer
            .is_authorized(&self.key, &associated.url, &url)
        {
            tracing::debug!("refusing push; not authorized; url={}", url);
            return None;
        }

        if !self.counts.can_inc_num_active_pushed() {
            tracing::debug!("refusing push; limit reached; url={}", url);
            return None;
        }

        Some(url)
    }

    fn recv_settings(&mut self, frame: frame::Settings) -> Result<(), Error> {
        if frame.is_ack() {
            tracing::trace!("recv SETTINGS ack");
            return Ok(());
        }

        if let Some(val) = frame.max_concurrent_streams() {
            let applied = self.counts.apply_max_concurrent_streams(val);
            self.settings_cache
                .set_max_concurrent_streams(&self.key, applied as u32);
        }

        if let Some(val) = frame.initial_window_size() {
            if val > MAX_WINDOW_SIZE {
                proto_err!(conn: "INITIAL_WINDOW_SIZE too large; val={}", val);
                return Err(Error::FlowControl);
            }
            self.apply_initial_window_size(val);
        }

        if let Some(val) = frame.max_frame_size() {
            self.codec.set_max_send_frame_size(val as usize);
        }

        self.prioritize.queue_control(frame::Settings::ack().into());
        self.push_event(SessionEvent::Settings(frame));
        self.process_pending_requests();
        Ok(())
    }

    /// Shift every stream's send window by the change in the peer's
    /// initial window size, then resume the streams that gained credit.
    fn apply_initial_window_size(&mut self, val: WindowSize) {
        let old = self.peer_initial_window_size;
        self.peer_initial_window_size = val;

        let delta = val as i64 - old as i64;
        if delta == 0 {
            return;
        }
        tracing::trace!("apply initial window size; old={}; new={}", old, val);

        let keys = self.store.refs();

        for &key in &keys {
            let result = match self.store.get_mut(key) {
                Some(stream) if !stream.is_detached => stream.send_flow.apply_delta(delta as i32),
                _ => continue,
            };

            if let Err(reason) = result {
                self.reset_stream(key, reason, Err(Error::FlowControl));
            }
        }

        let mut resumable: Vec<(Priority, StreamRef)> = keys
            .into_iter()
            .filter_map(|key| {
                let stream = self.store.get(key)?;
                if !stream.is_detached
                    && stream.is_stalled_by_stream
                    && !stream.send_flow.is_stalled()
                {
                    Some((stream.priority, key))
                } else {
                    None
                }
            })
            .collect();
        resumable.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, key) in resumable {
            if let Some(stream) = self.store.get_mut(key) {
                stream.is_stalled_by_stream = false;
            }
            self.send_stream_data(key);
        }
    }

    fn recv_window_update(&mut self, frame: frame::WindowUpdate) -> Result<(), Error> {
        let id = frame.stream_id();
        let increment = frame.size_increment();

        if id.is_zero() {
            if increment == 0 {
                proto_err!(conn: "zero session WINDOW_UPDATE");
                return Err(Error::Protocol(ProtocolError::ZeroWindowUpdate));
            }

            if self.send_flow.inc_window(increment).is_err() {
                proto_err!(conn: "session send window overflow; increment={}", increment);
                return Err(Error::FlowControl);
            }

            self.resume_session_stalled();
            return Ok(());
        }

        let key = match self.store.find_by_id(id) {
            Some(key) => key,
            None => {
                self.recv_for_missing_stream(id, "WINDOW_UPDATE");
                return Ok(());
            }
        };

        if increment == 0 {
            proto_err!(stream: "zero WINDOW_UPDATE; id={:?}", id);
            self.reset_stream(
                key,
                Reason::PROTOCOL_ERROR,
                Err(Error::Protocol(ProtocolError::ZeroWindowUpdate)),
            );
            return Ok(());
        }

        let stream = match self.store.get_mut(key) {
            Some(stream) => stream,
            None => return Ok(()),
        };

        if stream.send_flow.inc_window(increment).is_err() {
            proto_err!(stream: "stream send window overflow; id={:?}", id);
            self.reset_stream(key, Reason::FLOW_CONTROL_ERROR, Err(Error::FlowControl));
            return Ok(());
        }

        if stream.is_stalled_by_stream {
            stream.is_stalled_by_stream = false;
            self.send_stream_data(key);
        }

        Ok(())
    }

    fn recv_reset(&mut self, frame: frame::Reset) -> Result<(), Error> {
        let id = frame.stream_id();
        let reason = frame.reason();

        let key = match self.store.find_by_id(id) {
            Some(key) => key,
            None => {
                if self.is_idle_stream(id) {
                    proto_err!(stream: "RST_STREAM on idle stream; id={:?}", id);
                } else {
                    tracing::trace!("ignoring RST_STREAM for closed stream; id={:?}", id);
                }
                return Ok(());
            }
        };

        let response_complete = self
            .store
            .get(key)
            .map(|stream| stream.state.is_remote_closed())
            .unwrap_or(false);

        // NO_ERROR after a complete response only stops our upload
        let result = if reason == Reason::NO_ERROR && response_complete {
            Ok(())
        } else {
            Err(Error::from_reset(reason))
        };

        tracing::trace!("recv RST_STREAM; id={:?}; reason={:?}", id, reason);
        self.close_stream(key, result, Cause::Reset(reason));
        Ok(())
    }

    fn recv_ping(&mut self, frame: frame::Ping) -> Result<(), Error> {
        use super::ping_pong::ReceivedPing;

        match self.ping_pong.recv_ping(frame)? {
            ReceivedPing::MustAck(pong) => self.prioritize.queue_control(pong.into()),
            ReceivedPing::Pong => {}
        }

        Ok(())
    }

    fn recv_go_away(&mut self, frame: frame::GoAway) {
        let last_stream_id = self.go_away.recv_go_away(&frame);

        tracing::debug!(
            "recv GOAWAY; last_stream_id={:?}; reason={:?}",
            frame.last_stream_id(),
            frame.reason()
        );

        self.push_event(SessionEvent::GoAway {
            last_stream_id: frame.last_stream_id(),
            reason: frame.reason(),
            debug_data: frame.debug_data().clone(),
        });

        // streams above the last id were never processed by the peer
        self.start_going_away(last_stream_id, Error::StreamRefused);
    }

    /// Frames of unknown kinds are ignored, as long as they are sent on a
    /// stream that exists or existed.
    fn recv_unknown(&mut self, head: frame::Head) -> Result<(), Error> {
        let id = head.stream_id();

        if self.is_idle_stream(id) {
            proto_err!(conn: "unknown frame on idle stream; kind={:?}; id={:?}", head.kind(), id);
            return Err(Error::Protocol(ProtocolError::UnexpectedFrame));
        }

        tracing::trace!("ignoring unknown frame; id={:?}", id);
        Ok(())
    }

    // ===== Session control =====

    /// Send a PING to check that the peer is alive.
    pub fn send_ping(&mut self) {
        let now = self.now();
        let ping = self.ping_pong.send_ping(now);
        self.prioritize.queue_control(ping.into());
    }

    /// Close the session with [`Error::Timeout`] if a ping has gone
    /// unanswered for the hung interval and nothing was read meanwhile.
    pub fn check_ping_status(&mut self) -> Result<(), Error> {
        if self.ensure_open().is_err() {
            return Ok(());
        }

        let now = self.now();
        if let Err(err) = self.ping_pong.check(now, self.last_read) {
            self.close_on_error(err.clone());
            return Err(err);
        }

        Ok(())
    }

    /// Stop taking new streams and tell the peer. Active streams complete.
    pub fn go_away(&mut self, reason: Reason) {
        if self.ensure_open().is_err() {
            return;
        }

        if let Some(frame) = self.go_away.go_away(self.last_push_id, reason, "") {
            self.prioritize.queue_control(frame.into());
        }

        self.start_going_away(StreamId::MAX, Error::Aborted);
    }

    /// Close the session now, failing everything with `err`.
    pub fn close_on_error(&mut self, err: Error) {
        self.do_drain(Err(err));
    }

    /// The network changed: take no new streams, let active ones finish.
    pub fn on_network_change(&mut self) {
        tracing::debug!("network changed; going away");
        self.start_going_away(StreamId::MAX, Error::Aborted);
    }

    /// Close the session if nothing but unclaimed pushes is left on it.
    /// Returns whether it closed.
    pub fn close_if_idle(&mut self) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }

        let busy = self.requests.total_len() > 0
            || self.store.refs().into_iter().any(|key| match self.store.get(key) {
                Some(stream) => !stream.is_detached && !stream.is_unclaimed_push(),
                None => false,
            });

        if busy {
            return false;
        }

        tracing::debug!("closing idle session");
        self.do_drain(Ok(()));
        true
    }

    /// Move to GOING_AWAY: fail queued requests and streams that never went
    /// out, and close active streams above `last_stream_id` with
    /// `stream_err`.
    fn start_going_away(&mut self, last_stream_id: StreamId, stream_err: Error) {
        match self.availability {
            Availability::Draining | Availability::Closed => return,
            _ => {}
        }

        tracing::debug!("going away; last_stream_id={:?}", last_stream_id);
        self.set_availability(Availability::GoingAway);

        let failed = self.requests.fail_all(&Error::Aborted);
        if failed > 0 {
            tracing::trace!("aborted queued requests; count={}", failed);
        }

        for (id, key) in self.store.refs_by_id() {
            if id.is_client_initiated() && id > last_stream_id {
                self.close_stream(key, Err(stream_err.clone()), Cause::Session);
            }
        }

        for key in self.store.refs() {
            let created = match self.store.get(key) {
                Some(stream) => !stream.is_detached && stream.id.is_zero(),
                None => false,
            };
            if created {
                self.close_stream(key, Err(Error::Aborted), Cause::Session);
            }
        }

        for key in self.pushes.drain() {
            self.discard_push(key, Reason::CANCEL);
        }

        self.maybe_finish_going_away();
    }

    fn maybe_finish_going_away(&mut self) {
        if self.availability == Availability::GoingAway && !self.counts.has_streams() {
            self.do_drain(Ok(()));
        }
    }

    /// Fail everything left and start closing.
    ///
    /// Runs once; later calls are ignored.
    fn do_drain(&mut self, result: Result<(), Error>) {
        match self.availability {
            Availability::Draining | Availability::Closed => return,
            _ => {}
        }

        tracing::debug!("draining session; result={:?}", result);
        self.set_availability(Availability::Draining);
        self.close_result = Some(result.clone());

        let stream_err = match result {
            Ok(()) => Error::ConnectionClosed,
            Err(err) => {
                self.prioritize.clear_streams();
                if err.sends_go_away() {
                    let debug_data = match err {
                        Error::Timeout => "Failed ping.",
                        _ => "",
                    };
                    if let Some(frame) =
                        self.go_away
                            .go_away(self.last_push_id, err.go_away_reason(), debug_data)
                    {
                        self.prioritize.queue_control(frame.into());
                    }
                }
                err
            }
        };

        self.requests.close(stream_err.clone());

        for key in self.store.refs() {
            self.close_stream(key, Err(stream_err.clone()), Cause::Session);
        }

        for key in self.pushes.drain() {
            self.store.remove(key);
        }
    }

    fn set_availability(&mut self, availability: Availability) {
        if self.availability != availability {
            tracing::trace!(
                "availability; old={:?}; new={:?}",
                self.availability,
                availability
            );
            self.availability = availability;
            self.push_event(SessionEvent::Availability(availability));
        }
    }

    // ===== Session events =====

    /// Next connection level event. `None` once the session is closed and
    /// every event was taken.
    pub fn poll_session_event(&mut self, cx: &mut Context) -> Poll<Option<SessionEvent>> {
        match self.events.pop_front() {
            Some(event) => Poll::Ready(Some(event)),
            None if self.availability == Availability::Closed => Poll::Ready(None),
            None => {
                self.event_task = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    fn push_event(&mut self, event: SessionEvent) {
        self.events.push_back(event);
        if let Some(task) = self.event_task.take() {
            task.wake();
        }
    }

    fn now(&self) -> Instant {
        (self.clock)()
    }

    // ===== Inspection =====

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// Active streams, pushed ones included.
    pub fn num_active_streams(&self) -> usize {
        self.counts.num_active()
    }

    /// Streams handed out but not activated yet.
    pub fn num_created_streams(&self) -> usize {
        self.counts.num_created()
    }

    pub fn num_pushed_streams(&self) -> usize {
        self.counts.num_pushed()
    }

    /// Pushed streams whose response headers have arrived.
    pub fn num_active_pushed_streams(&self) -> usize {
        self.counts.num_active_pushed()
    }

    pub fn num_unclaimed_pushed_streams(&self) -> usize {
        self.pushes.len()
    }

    pub fn pending_requests(&self, priority: Priority) -> usize {
        self.requests.len(priority)
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.counts.max_concurrent_streams()
    }

    pub fn session_send_window(&self) -> i32 {
        self.send_flow.window_size().as_i32()
    }

    pub fn session_recv_window(&self) -> i32 {
        self.recv_flow.window_size().as_i32()
    }

    /// Received bytes released by their owners but not yet announced to
    /// the peer.
    pub fn session_unacked_recv_bytes(&self) -> WindowSize {
        self.recv_flow.unacked()
    }

    pub fn pings_in_flight(&self) -> usize {
        self.ping_pong.pings_in_flight()
    }

    pub fn num_stalled_streams(&self) -> usize {
        self.prioritize.num_stalled()
    }

    pub fn stream_id(&self, key: StreamRef) -> Option<StreamId> {
        self.store.get(key).map(|stream| stream.id)
    }

    pub fn stream_state(&self, key: StreamRef) -> Option<StreamState> {
        self.store.get(key).map(|stream| stream.state.public())
    }

    pub fn stream_send_window(&self, key: StreamRef) -> Option<i32> {
        self.store
            .get(key)
            .map(|stream| stream.send_flow.window_size().as_i32())
    }

    pub fn stream_recv_window(&self, key: StreamRef) -> Option<i32> {
        self.store
            .get(key)
            .map(|stream| stream.recv_flow.window_size().as_i32())
    }

    /// Whether the stream has body bytes waiting for send credit.
    pub fn is_send_stalled(&self, key: StreamRef) -> bool {
        self.store
            .get(key)
            .map(|stream| stream.is_stalled_by_stream || stream.is_stalled_by_session)
            .unwrap_or(false)
    }

    pub fn priority(&self, key: StreamRef) -> Option<Priority> {
        self.store.get(key).map(|stream| stream.priority)
    }

    pub fn url(&self, key: StreamRef) -> Option<&Url> {
        self.store.get(key).map(|stream| &stream.url)
    }

    /// Whether a pushed stream's promise came in on `id`.
    pub fn is_pushed_on(&self, key: StreamRef, id: StreamId) -> bool {
        match self.store.get(key).and_then(|stream| stream.push) {
            Some(push) => push.associated_id == id,
            None => false,
        }
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Session")
            .field("key", &self.key)
            .field("availability", &self.availability)
            .field("counts", &self.counts)
            .field("send_flow", &self.send_flow)
            .field("recv_flow", &self.recv_flow)
            .field("pushes", &self.pushes)
            .finish()
    }
}
