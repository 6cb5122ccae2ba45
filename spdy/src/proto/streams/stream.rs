use bytes::Bytes;
use std::collections::VecDeque;
use std::task::{Context, Waker};
use std::time::Instant;
use url::Url;

use super::*;

/// One logical exchange within a session.
///
/// Streams live in the session's [`Store`] and are addressed by a
/// generation checked [`StreamRef`]. A stream stays in the store after it
/// closes until its owner has observed the `Closed` event, so buffered
/// events are never lost.
#[derive(Debug)]
pub(crate) struct Stream {
    /// Zero until the stream is activated.
    pub id: StreamId,
    pub priority: Priority,
    pub url: Url,
    pub kind: StreamKind,
    pub state: State,

    pub counted: Counted,

    pub send_flow: SendWindow,
    /// Body bytes accepted from the caller but not yet framed.
    pub pending_send: VecDeque<Bytes>,
    pub buffered_send_data: usize,
    /// END_STREAM goes out with the last buffered byte.
    pub pending_send_eos: bool,
    /// The frame carrying END_STREAM has been queued for writing.
    pub end_stream_queued: bool,
    pub is_stalled_by_stream: bool,
    pub is_stalled_by_session: bool,

    pub recv_flow: RecvWindow,
    /// Received DATA bytes the owner has not released yet.
    pub in_flight_recv_data: WindowSize,
    pub pending_recv: VecDeque<StreamEvent>,
    recv_task: Option<Waker>,

    /// Set once the stream has been detached from the session's
    /// bookkeeping. Only the owner's final poll remains.
    pub is_detached: bool,

    pub push: Option<PushState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Request,
    Pushed,
}

/// Which session counters this stream currently contributes to.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counted {
    pub created: bool,
    pub active: bool,
    pub pushed: bool,
    pub active_pushed: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PushState {
    pub associated_id: StreamId,
    pub promised_at: Instant,
    pub claimed: bool,
}

/// Something a stream's owner observes.
#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    /// Response headers.
    Headers(HeaderBlock),
    /// A chunk of the response body. Its length must eventually be handed
    /// back through `release_capacity`.
    Data(Bytes),
    /// Trailing headers, which also end the stream.
    Trailers(HeaderBlock),
    /// The stream is finished. Delivered exactly once, last.
    Closed(Result<(), Error>),
}

impl Stream {
    pub fn new(
        url: Url,
        priority: Priority,
        kind: StreamKind,
        init_send_window: WindowSize,
        init_recv_window: WindowSize,
    ) -> Stream {
        Stream {
            id: StreamId::ZERO,
            priority,
            url,
            kind,
            state: State::default(),
            counted: Counted::default(),
            send_flow: SendWindow::new(init_send_window),
            pending_send: VecDeque::new(),
            buffered_send_data: 0,
            pending_send_eos: false,
            end_stream_queued: false,
            is_stalled_by_stream: false,
            is_stalled_by_session: false,
            recv_flow: RecvWindow::new(init_recv_window, init_recv_window),
            in_flight_recv_data: 0,
            pending_recv: VecDeque::new(),
            recv_task: None,
            is_detached: false,
            push: None,
        }
    }

    pub fn has_pending_send(&self) -> bool {
        self.buffered_send_data > 0 || (self.pending_send_eos && !self.end_stream_queued)
    }

    pub fn buffer_send(&mut self, data: Bytes, eos: bool) {
        self.buffered_send_data += data.len();
        if !data.is_empty() {
            self.pending_send.push_back(data);
        }
        self.pending_send_eos = eos;
    }

    /// Take up to `max` buffered body bytes.
    pub fn take_send_chunk(&mut self, max: usize) -> Bytes {
        let mut chunk = match self.pending_send.pop_front() {
            Some(chunk) => chunk,
            None => return Bytes::new(),
        };

        if chunk.len() > max {
            let rest = chunk.split_off(max);
            self.pending_send.push_front(rest);
        }

        self.buffered_send_data -= chunk.len();
        chunk
    }

    /// Drop unsent body bytes, returning how many there were.
    pub fn clear_send(&mut self) -> usize {
        let n = self.buffered_send_data;
        self.pending_send.clear();
        self.buffered_send_data = 0;
        self.pending_send_eos = false;
        self.end_stream_queued = false;
        n
    }

    pub fn push_event(&mut self, event: StreamEvent) {
        self.pending_recv.push_back(event);
        self.notify_recv();
    }

    pub fn poll_event(&mut self, cx: &mut Context) -> Option<StreamEvent> {
        match self.pending_recv.pop_front() {
            Some(event) => Some(event),
            None => {
                self.recv_task = Some(cx.waker().clone());
                None
            }
        }
    }

    pub fn notify_recv(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.wake();
        }
    }

    pub fn is_pushed(&self) -> bool {
        self.kind == StreamKind::Pushed
    }

    pub fn is_unclaimed_push(&self) -> bool {
        matches!(self.push, Some(PushState { claimed: false, .. }))
    }
}
