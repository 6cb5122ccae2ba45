use bytes::{Buf, BytesMut};
use futures_util::io::AsyncWrite;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::codec::{HeaderCodec, SendError, UserError};
use crate::frame::{self, Frame, FrameSize};

/// Serializes frames into a write buffer and drains it into the transport.
#[derive(Debug)]
pub struct FramedWrite {
    buf: BytesMut,
    max_frame_size: FrameSize,
}

const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1_024;

impl FramedWrite {
    pub fn new() -> FramedWrite {
        FramedWrite {
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY),
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Append raw bytes, used for the connection preface.
    pub fn buffer_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffer(
        &mut self,
        item: Frame,
        header_codec: &mut dyn HeaderCodec,
    ) -> Result<(), SendError> {
        let span = tracing::trace_span!("FramedWrite::buffer", frame = ?item);
        let _e = span.enter();

        tracing::debug!(frame = ?item, "send");

        serialize(item, header_codec, self.max_frame_size(), &mut self.buf)?;
        tracing::trace!(rem = self.buf.len(), "encoded frame");
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn poll_flush<T>(&mut self, io: &mut T, cx: &mut Context) -> Poll<io::Result<()>>
    where
        T: AsyncWrite + Unpin,
    {
        let span = tracing::trace_span!("FramedWrite::flush");
        let _e = span.enter();

        while self.buf.has_remaining() {
            let n = ready!(Pin::new(&mut *io).poll_write(cx, self.buf.chunk()))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.buf.advance(n);
        }

        tracing::trace!("flushing buffer");
        ready!(Pin::new(&mut *io).poll_flush(cx))?;

        Poll::Ready(Ok(()))
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size as usize
    }

    pub fn set_max_frame_size(&mut self, val: usize) {
        assert!(val <= frame::MAX_MAX_FRAME_SIZE as usize);
        self.max_frame_size = val as FrameSize;
    }
}

impl Default for FramedWrite {
    fn default() -> Self {
        FramedWrite::new()
    }
}

/// Serialize one frame into `dst`.
pub fn serialize(
    item: Frame,
    header_codec: &mut dyn HeaderCodec,
    max_frame_size: usize,
    dst: &mut BytesMut,
) -> Result<(), SendError> {
    match item {
        Frame::Data(v) => {
            if v.flow_len() > max_frame_size {
                return Err(UserError::PayloadTooBig.into());
            }
            v.encode(dst);
        }
        Frame::Headers(v) => {
            v.encode(header_codec, max_frame_size, dst)?;
        }
        Frame::PushPromise(v) => {
            v.encode(header_codec, max_frame_size, dst)?;
        }
        Frame::Settings(v) => v.encode(dst),
        Frame::GoAway(v) => v.encode(dst),
        Frame::Ping(v) => v.encode(dst),
        Frame::WindowUpdate(v) => v.encode(dst),
        Frame::Reset(v) => v.encode(dst),
        Frame::Unknown(_) => {
            return Err(UserError::UnexpectedFrameType.into());
        }
    }

    Ok(())
}
