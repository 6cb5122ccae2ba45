use bytes::{Bytes, BytesMut};

use crate::codec::HeaderCodec;
use crate::proto::DEFAULT_MAX_HEADER_LIST_SIZE;
use crate::frame::{self, Continuation, Frame, Head, Headers, Kind, PushPromise, HEADER_LEN};

/// Incremental frame parser.
///
/// Frames are cut out of the read buffer as soon as they are complete.
/// A HEADERS or PUSH_PROMISE without END_HEADERS is held back until its
/// CONTINUATION frames have arrived, so the session only ever sees whole
/// header blocks. A block growing past `max_header_list_size` is an error.
#[derive(Debug)]
pub struct FramedRead {
    partial: Option<Partial>,
    max_frame_size: usize,
    max_header_list_size: usize,
    /// Bytes taken from the buffer since the last returned frame.
    consumed: usize,
    last_frame_len: usize,
}

#[derive(Debug)]
struct Partial {
    frame: Continuable,
    buf: BytesMut,
}

#[derive(Debug)]
enum Continuable {
    Headers(Headers),
    PushPromise(PushPromise),
}

const PRIORITY_LEN: usize = 5;

impl FramedRead {
    pub fn new() -> FramedRead {
        FramedRead {
            partial: None,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE as usize,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
            consumed: 0,
            last_frame_len: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, val: usize) {
        assert!(
            frame::DEFAULT_MAX_FRAME_SIZE as usize <= val
                && val <= frame::MAX_MAX_FRAME_SIZE as usize
        );
        self.max_frame_size = val
    }

    pub fn set_max_header_list_size(&mut self, val: usize) {
        self.max_header_list_size = val;
    }

    /// Wire bytes (headers and payloads) behind the last returned frame,
    /// including every frame folded into it.
    pub fn last_frame_len(&self) -> usize {
        self.last_frame_len
    }

    /// Parse the next complete frame out of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn decode_frame(
        &mut self,
        src: &mut BytesMut,
        header_codec: &mut dyn HeaderCodec,
    ) -> Result<Option<Frame>, frame::Error> {
        loop {
            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            let (head, len) = Head::parse(&src[..HEADER_LEN]);

            if len > self.max_frame_size {
                proto_err!(conn: "frame size {} exceeds max {}", len, self.max_frame_size);
                return Err(frame::Error::ControlPayloadTooLarge);
            }

            if src.len() < HEADER_LEN + len {
                return Ok(None);
            }

            let mut bytes = src.split_to(HEADER_LEN + len).freeze();
            let payload = bytes.split_off(HEADER_LEN);
            self.consumed += HEADER_LEN + len;

            tracing::trace!(kind = ?head.kind(), stream_id = ?head.stream_id(), len, "read frame");

            if let Some(frame) = self.decode_payload(head, payload, header_codec)? {
                self.last_frame_len = std::mem::replace(&mut self.consumed, 0);
                return Ok(Some(frame));
            }
        }
    }

    fn decode_payload(
        &mut self,
        head: Head,
        payload: Bytes,
        header_codec: &mut dyn HeaderCodec,
    ) -> Result<Option<Frame>, frame::Error> {
        let kind = head.kind();

        if self.partial.is_some() && kind != Kind::Continuation {
            proto_err!(conn: "expected CONTINUATION, got {:?}", kind);
            return Err(frame::Error::UnexpectedFrame);
        }

        let frame = match kind {
            Kind::Data => frame::Data::load(head, payload)?.into(),
            Kind::Headers => {
                let (headers, fragment) = Headers::load(head, payload)?;
                let end = headers.is_end_headers();
                return self.begin_block(Continuable::Headers(headers), fragment, end, header_codec);
            }
            Kind::PushPromise => {
                let (promise, fragment) = PushPromise::load(head, payload)?;
                let end = promise.is_end_headers();
                return self.begin_block(
                    Continuable::PushPromise(promise),
                    fragment,
                    end,
                    header_codec,
                );
            }
            Kind::Continuation => {
                let continuation = Continuation::load(head);
                return self.continue_block(continuation, payload, header_codec);
            }
            Kind::Settings => frame::Settings::load(head, &payload)?.into(),
            Kind::Ping => frame::Ping::load(head, &payload)?.into(),
            Kind::GoAway => frame::GoAway::load(head, &payload)?.into(),
            Kind::WindowUpdate => frame::WindowUpdate::load(head, &payload)?.into(),
            Kind::Reset => frame::Reset::load(head, &payload)?.into(),
            Kind::Priority => {
                if head.stream_id().is_zero() {
                    return Err(frame::Error::InvalidStreamId);
                }
                if payload.len() != PRIORITY_LEN {
                    return Err(frame::Error::InvalidControlFrameSize);
                }
                tracing::trace!(stream_id = ?head.stream_id(), "ignoring PRIORITY");
                return Ok(None);
            }
            Kind::Unknown => Frame::Unknown(head),
        };

        Ok(Some(frame))
    }

    fn begin_block(
        &mut self,
        frame: Continuable,
        fragment: Bytes,
        end_headers: bool,
        header_codec: &mut dyn HeaderCodec,
    ) -> Result<Option<Frame>, frame::Error> {
        self.check_block_size(0, fragment.len())?;

        let mut buf = BytesMut::with_capacity(fragment.len());
        buf.extend_from_slice(&fragment);

        let partial = Partial { frame, buf };

        if end_headers {
            partial.finish(header_codec).map(Some)
        } else {
            self.partial = Some(partial);
            Ok(None)
        }
    }

    fn continue_block(
        &mut self,
        continuation: Continuation,
        fragment: Bytes,
        header_codec: &mut dyn HeaderCodec,
    ) -> Result<Option<Frame>, frame::Error> {
        let mut partial = match self.partial.take() {
            Some(partial) => partial,
            None => {
                proto_err!(conn: "CONTINUATION without a header block in progress");
                return Err(frame::Error::UnexpectedFrame);
            }
        };

        if partial.stream_id() != continuation.stream_id() {
            proto_err!(conn: "CONTINUATION on a different stream");
            return Err(frame::Error::UnexpectedFrame);
        }

        self.check_block_size(partial.buf.len(), fragment.len())?;
        partial.buf.extend_from_slice(&fragment);

        if continuation.is_end_headers() {
            partial.finish(header_codec).map(Some)
        } else {
            self.partial = Some(partial);
            Ok(None)
        }
    }

    fn check_block_size(&self, buffered: usize, fragment: usize) -> Result<(), frame::Error> {
        if buffered + fragment > self.max_header_list_size {
            proto_err!(conn:
                "header block too large; size={}; max={}",
                buffered + fragment,
                self.max_header_list_size
            );
            return Err(frame::Error::ControlPayloadTooLarge);
        }
        Ok(())
    }
}

impl Default for FramedRead {
    fn default() -> Self {
        FramedRead::new()
    }
}

impl Partial {
    fn stream_id(&self) -> frame::StreamId {
        match self.frame {
            Continuable::Headers(ref h) => h.stream_id(),
            Continuable::PushPromise(ref p) => p.stream_id(),
        }
    }

    fn finish(self, header_codec: &mut dyn HeaderCodec) -> Result<Frame, frame::Error> {
        let block = header_codec.decode(&self.buf).map_err(|_| {
            proto_err!(conn: "failed to decode header block");
            frame::Error::DecompressFailure
        })?;

        Ok(match self.frame {
            Continuable::Headers(mut headers) => {
                headers.set_block(block);
                headers.into()
            }
            Continuable::PushPromise(mut promise) => {
                promise.set_block(block);
                promise.into()
            }
        })
    }
}
