use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::codec::{HeaderBlock, HeaderCodec};
use crate::frame::{util, Error, Frame, Head, Kind, StreamId};

/// HEADERS frame, carrying a decoded header block.
#[derive(Eq, PartialEq)]
pub struct Headers {
    stream_id: StreamId,
    block: HeaderBlock,
    flags: HeadersFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct HeadersFlag(u8);

/// PUSH_PROMISE frame: the peer reserves `promised_id` for a pushed
/// response to the request described by the header block.
#[derive(Eq, PartialEq)]
pub struct PushPromise {
    stream_id: StreamId,
    promised_id: StreamId,
    block: HeaderBlock,
    flags: PushPromiseFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PushPromiseFlag(u8);

/// The head of a CONTINUATION frame. Continuations never reach the
/// session; the read side folds them into the frame they continue.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Continuation {
    stream_id: StreamId,
    end_headers: bool,
}

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;
const ALL: u8 = END_STREAM | END_HEADERS | PADDED | PRIORITY;

const PRIORITY_LEN: usize = 5;

impl Headers {
    pub fn new(stream_id: StreamId, block: HeaderBlock) -> Self {
        let mut flags = HeadersFlag::default();
        flags.set_end_headers();

        Headers {
            stream_id,
            block,
            flags,
        }
    }

    /// Parse the fixed part of a HEADERS frame. The returned fragment is the
    /// start of the compressed header block; the caller decodes it once
    /// END_HEADERS has been seen.
    pub fn load(head: Head, mut src: Bytes) -> Result<(Self, Bytes), Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = HeadersFlag(head.flag() & ALL);

        tracing::trace!("loading headers; flags={:?}", flags);

        if flags.is_padded() {
            util::strip_padding(&mut src)?;
        }

        if flags.is_priority() {
            if src.len() < PRIORITY_LEN {
                return Err(Error::InvalidControlFrame);
            }
            src.advance(PRIORITY_LEN);
        }

        let headers = Headers {
            stream_id: head.stream_id(),
            block: HeaderBlock::new(),
            flags,
        };

        Ok((headers, src))
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self) {
        self.flags.set_end_stream()
    }

    pub fn block(&self) -> &HeaderBlock {
        &self.block
    }

    pub(crate) fn set_block(&mut self, block: HeaderBlock) {
        self.block = block;
    }

    pub fn into_block(self) -> HeaderBlock {
        self.block
    }

    pub(crate) fn encode(
        self,
        header_codec: &mut dyn HeaderCodec,
        max_frame_size: usize,
        dst: &mut BytesMut,
    ) -> Result<(), Error> {
        let mut flags = self.flags;
        flags.0 &= END_STREAM | END_HEADERS;
        let head = Head::new(Kind::Headers, flags.into(), self.stream_id);

        let fragment = compress(header_codec, &self.block)?;
        encode_block(head, &[], fragment, max_frame_size, dst);
        Ok(())
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Self {
        Frame::Headers(src)
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Headers")
            .field("stream_id", &self.stream_id)
            .field("flags", &self.flags)
            .finish()
    }
}

impl PushPromise {
    pub fn new(stream_id: StreamId, promised_id: StreamId, block: HeaderBlock) -> Self {
        let mut flags = PushPromiseFlag::default();
        flags.set_end_headers();

        PushPromise {
            stream_id,
            promised_id,
            block,
            flags,
        }
    }

    pub fn load(head: Head, mut src: Bytes) -> Result<(Self, Bytes), Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = PushPromiseFlag(head.flag() & (END_HEADERS | PADDED));

        if flags.is_padded() {
            util::strip_padding(&mut src)?;
        }

        if src.len() < 4 {
            return Err(Error::InvalidControlFrame);
        }

        let (promised_id, _) = StreamId::parse(&src[..4]);
        src.advance(4);

        if !promised_id.is_server_initiated() {
            return Err(Error::InvalidStreamId);
        }

        let frame = PushPromise {
            stream_id: head.stream_id(),
            promised_id,
            block: HeaderBlock::new(),
            flags,
        };

        Ok((frame, src))
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn promised_id(&self) -> StreamId {
        self.promised_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn block(&self) -> &HeaderBlock {
        &self.block
    }

    pub(crate) fn set_block(&mut self, block: HeaderBlock) {
        self.block = block;
    }

    pub fn into_block(self) -> HeaderBlock {
        self.block
    }

    pub(crate) fn encode(
        self,
        header_codec: &mut dyn HeaderCodec,
        max_frame_size: usize,
        dst: &mut BytesMut,
    ) -> Result<(), Error> {
        let head = Head::new(Kind::PushPromise, END_HEADERS, self.stream_id);
        let promised: u32 = self.promised_id.into();

        let fragment = compress(header_codec, &self.block)?;
        encode_block(head, &promised.to_be_bytes(), fragment, max_frame_size, dst);
        Ok(())
    }
}

impl From<PushPromise> for Frame {
    fn from(src: PushPromise) -> Self {
        Frame::PushPromise(src)
    }
}

impl fmt::Debug for PushPromise {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PushPromise")
            .field("stream_id", &self.stream_id)
            .field("promised_id", &self.promised_id)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Continuation {
    pub fn load(head: Head) -> Continuation {
        Continuation {
            stream_id: head.stream_id(),
            end_headers: head.flag() & END_HEADERS == END_HEADERS,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.end_headers
    }
}

fn compress(header_codec: &mut dyn HeaderCodec, block: &HeaderBlock) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    header_codec
        .encode(block, &mut buf)
        .map_err(|_| Error::CompressFailure)?;
    Ok(buf.freeze())
}

/// Write a header block as one frame, or as a frame followed by
/// CONTINUATION frames when it does not fit in `max_frame_size`.
fn encode_block(
    head: Head,
    prefix: &[u8],
    mut fragment: Bytes,
    max_frame_size: usize,
    dst: &mut BytesMut,
) {
    let first_len = max_frame_size.saturating_sub(prefix.len());
    let end_headers = head.flag() & END_HEADERS;

    if fragment.len() <= first_len {
        head.encode(prefix.len() + fragment.len(), dst);
        dst.put_slice(prefix);
        dst.put_slice(&fragment);
        return;
    }

    let head = Head::new(head.kind(), head.flag() & !END_HEADERS, head.stream_id());
    let chunk = fragment.split_to(first_len);
    head.encode(prefix.len() + chunk.len(), dst);
    dst.put_slice(prefix);
    dst.put_slice(&chunk);

    while !fragment.is_empty() {
        let len = fragment.len().min(max_frame_size);
        let chunk = fragment.split_to(len);
        let flag = if fragment.is_empty() { end_headers } else { 0 };

        Head::new(Kind::Continuation, flag, head.stream_id()).encode(chunk.len(), dst);
        dst.put_slice(&chunk);
    }
}

impl HeadersFlag {
    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn is_priority(&self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }
}

impl Default for HeadersFlag {
    fn default() -> Self {
        HeadersFlag(0)
    }
}

impl From<HeadersFlag> for u8 {
    fn from(src: HeadersFlag) -> u8 {
        src.0
    }
}

impl fmt::Debug for HeadersFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_headers(), "END_HEADERS")
            .flag_if(self.is_end_stream(), "END_STREAM")
            .flag_if(self.is_padded(), "PADDED")
            .flag_if(self.is_priority(), "PRIORITY")
            .finish()
    }
}

impl PushPromiseFlag {
    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }
}

impl Default for PushPromiseFlag {
    fn default() -> Self {
        PushPromiseFlag(0)
    }
}

impl fmt::Debug for PushPromiseFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_headers(), "END_HEADERS")
            .flag_if(self.is_padded(), "PADDED")
            .finish()
    }
}
