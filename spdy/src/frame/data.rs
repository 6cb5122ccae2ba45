use bytes::{BufMut, Bytes};
use std::fmt;

use crate::frame::{util, Error, Frame, Head, Kind, StreamId};

#[derive(Eq, PartialEq)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    flags: DataFlags,
    pad_len: Option<u8>,
}

#[derive(Copy, Clone, Eq, PartialEq)]
struct DataFlags(u8);

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;
const ALL: u8 = END_STREAM | PADDED;

impl Data {
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        assert!(!stream_id.is_zero());

        Data {
            stream_id,
            data: payload,
            flags: DataFlags::default(),
            pad_len: None,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self, val: bool) {
        if val {
            self.flags.set_end_stream();
        } else {
            self.flags.unset_end_stream();
        }
    }

    pub fn is_padded(&self) -> bool {
        self.flags.is_padded()
    }

    /// Pad the frame with `pad_len` zero bytes on the wire.
    pub fn set_padding(&mut self, pad_len: u8) {
        self.flags.set_padded();
        self.pad_len = Some(pad_len);
    }

    pub fn pad_len(&self) -> Option<u8> {
        self.pad_len
    }

    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    pub fn into_payload(self) -> Bytes {
        self.data
    }

    /// Number of bytes this frame counts against flow control: the payload,
    /// plus the pad length octet and the padding when the frame is padded.
    pub fn flow_len(&self) -> usize {
        self.data.len() + self.padding_len()
    }

    /// Bytes of the frame that are padding, including the pad length octet.
    pub fn padding_len(&self) -> usize {
        match self.pad_len {
            Some(pad_len) => pad_len as usize + 1,
            None => 0,
        }
    }

    pub(crate) fn head(&self) -> Head {
        Head::new(Kind::Data, self.flags.into(), self.stream_id)
    }

    pub(crate) fn load(head: Head, mut payload: Bytes) -> Result<Self, Error> {
        if head.flag() & !ALL != 0 {
            return Err(Error::InvalidDataFrameFlags);
        }

        let flags = DataFlags::load(head.flag());

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let pad_len = if flags.is_padded() {
            let len = util::strip_padding(&mut payload)?;
            Some(len)
        } else {
            None
        };

        Ok(Data {
            stream_id: head.stream_id(),
            data: payload,
            flags,
            pad_len,
        })
    }

    pub(crate) fn encode<U: BufMut>(&self, dst: &mut U) {
        self.head().encode(self.flow_len(), dst);

        if let Some(pad_len) = self.pad_len {
            dst.put_u8(pad_len);
        }

        dst.put_slice(&self.data);

        if let Some(pad_len) = self.pad_len {
            dst.put_bytes(0, pad_len as usize);
        }
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Self {
        Frame::Data(src)
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut f = fmt.debug_struct("Data");
        f.field("stream_id", &self.stream_id);
        f.field("len", &self.data.len());
        if !self.flags.is_empty() {
            f.field("flags", &self.flags);
        }
        if let Some(ref pad_len) = self.pad_len {
            f.field("pad_len", pad_len);
        }
        f.finish()
    }
}

impl DataFlags {
    fn load(bits: u8) -> DataFlags {
        DataFlags(bits & ALL)
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    fn set_end_stream(&mut self) {
        self.0 |= END_STREAM
    }

    fn unset_end_stream(&mut self) {
        self.0 &= !END_STREAM
    }

    fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    fn set_padded(&mut self) {
        self.0 |= PADDED
    }
}

impl Default for DataFlags {
    fn default() -> Self {
        DataFlags(0)
    }
}

impl From<DataFlags> for u8 {
    fn from(src: DataFlags) -> u8 {
        src.0
    }
}

impl fmt::Debug for DataFlags {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_stream(), "END_STREAM")
            .flag_if(self.is_padded(), "PADDED")
            .finish()
    }
}
