use bytes::{BufMut, BytesMut};

use crate::frame::{Error, Frame, Head, Kind, StreamId};

const ACK_FLAG: u8 = 0x1;

/// PING frame. The 8 byte opaque payload is read as a big endian id so the
/// session can tell its own pings (odd ids) from the peer's (even ids).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Ping {
    ack: bool,
    id: u64,
}

impl Ping {
    pub fn new(id: u64) -> Ping {
        Ping { ack: false, id }
    }

    pub fn pong(id: u64) -> Ping {
        Ping { ack: true, id }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn load(head: Head, bytes: &[u8]) -> Result<Ping, Error> {
        debug_assert_eq!(head.kind(), Kind::Ping);

        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if bytes.len() != 8 {
            return Err(Error::InvalidControlFrameSize);
        }

        let mut payload = [0; 8];
        payload.copy_from_slice(bytes);

        let ack = head.flag() & ACK_FLAG != 0;

        Ok(Ping {
            ack,
            id: u64::from_be_bytes(payload),
        })
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        let sz = 8;
        tracing::trace!("encoding PING; ack={} len={}", self.ack, sz);

        let flags = if self.ack { ACK_FLAG } else { 0 };
        let head = Head::new(Kind::Ping, flags, StreamId::ZERO);

        head.encode(sz, dst);
        dst.put_u64(self.id);
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Frame {
        Frame::Ping(src)
    }
}
