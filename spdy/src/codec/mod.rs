mod error;
mod framed_read;
mod framed_write;
mod header_block;

pub use self::error::{RecvError, SendError, UserError};
pub use self::framed_read::FramedRead;
pub use self::framed_write::{serialize, FramedWrite};
pub use self::header_block::{CompressionError, HeaderBlock, HeaderCodec, PlainHeaderCodec};

use bytes::BytesMut;
use futures_util::io::{AsyncRead, AsyncWrite};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::frame::{self, Frame};

const READ_CHUNK: usize = 8 * 1_024;

/// The frame boundary of a session: a transport plus a frame parser and a
/// frame serializer sharing one header codec.
pub struct Codec<T> {
    inner: T,
    read_buf: BytesMut,
    framed_read: FramedRead,
    framed_write: FramedWrite,
    header_codec: Box<dyn HeaderCodec>,
    is_eof: bool,
}

/// Parse the next frame out of `src` without any transport.
///
/// `Ok(None)` means more bytes are needed.
pub fn parse_next(
    src: &mut BytesMut,
    header_codec: &mut dyn HeaderCodec,
) -> Result<Option<Frame>, frame::Error> {
    FramedRead::new().decode_frame(src, header_codec)
}

impl<T> Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, header_codec: Box<dyn HeaderCodec>) -> Codec<T> {
        Codec {
            inner: io,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            framed_read: FramedRead::new(),
            framed_write: FramedWrite::new(),
            header_codec,
            is_eof: false,
        }
    }

    /// Read the next frame. `None` signals a clean EOF.
    pub fn poll_next(&mut self, cx: &mut Context) -> Poll<Option<Result<Frame, RecvError>>> {
        let mut chunk = [0; READ_CHUNK];

        loop {
            let decoded = self
                .framed_read
                .decode_frame(&mut self.read_buf, &mut *self.header_codec)?;

            if let Some(frame) = decoded {
                return Poll::Ready(Some(Ok(frame)));
            }

            if self.is_eof {
                if self.read_buf.is_empty() {
                    return Poll::Ready(None);
                }
                let err = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-frame");
                return Poll::Ready(Some(Err(err.into())));
            }

            let n = ready!(Pin::new(&mut self.inner).poll_read(cx, &mut chunk))?;
            if n == 0 {
                tracing::trace!("transport EOF");
                self.is_eof = true;
            } else {
                self.read_buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    pub fn buffer(&mut self, item: Frame) -> Result<(), SendError> {
        self.framed_write.buffer(item, &mut *self.header_codec)
    }

    pub fn buffer_raw(&mut self, bytes: &[u8]) {
        self.framed_write.buffer_raw(bytes)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.framed_write.has_pending()
    }

    pub fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write.poll_flush(&mut self.inner, cx)
    }

    pub fn poll_close(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        ready!(self.poll_flush(cx))?;
        Pin::new(&mut self.inner).poll_close(cx)
    }

    pub fn last_frame_len(&self) -> usize {
        self.framed_read.last_frame_len()
    }

    pub fn set_max_recv_header_list_size(&mut self, val: usize) {
        self.framed_read.set_max_header_list_size(val)
    }

    pub fn max_send_frame_size(&self) -> usize {
        self.framed_write.max_frame_size()
    }

    pub fn set_max_send_frame_size(&mut self, val: usize) {
        self.framed_write.set_max_frame_size(val)
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Codec")
            .field("read_buf", &self.read_buf.len())
            .field("framed_read", &self.framed_read)
            .field("framed_write", &self.framed_write)
            .field("is_eof", &self.is_eof)
            .finish()
    }
}
