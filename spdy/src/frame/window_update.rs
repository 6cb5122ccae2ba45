use bytes::{BufMut, BytesMut};

use crate::frame::{Error, Frame, Head, Kind, StreamId};

const SIZE_INCREMENT_MASK: u32 = 1 << 31;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WindowUpdate {
    stream_id: StreamId,
    size_increment: u32,
}

impl WindowUpdate {
    pub fn new(stream_id: StreamId, size_increment: u32) -> WindowUpdate {
        WindowUpdate {
            stream_id,
            size_increment,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn size_increment(&self) -> u32 {
        self.size_increment
    }

    /// A zero increment parses successfully; whether it is a stream or a
    /// connection error depends on the stream it addresses.
    pub fn load(head: Head, payload: &[u8]) -> Result<WindowUpdate, Error> {
        debug_assert_eq!(head.kind(), Kind::WindowUpdate);
        if payload.len() != 4 {
            return Err(Error::InvalidControlFrameSize);
        }

        let size_increment = unpack_octets_4!(payload, 0, u32) & !SIZE_INCREMENT_MASK;

        Ok(WindowUpdate {
            stream_id: head.stream_id(),
            size_increment,
        })
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        tracing::trace!("encoding WINDOW_UPDATE; id={:?}", self.stream_id);
        let head = Head::new(Kind::WindowUpdate, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.size_increment);
    }
}

impl From<WindowUpdate> for Frame {
    fn from(src: WindowUpdate) -> Self {
        Frame::WindowUpdate(src)
    }
}
