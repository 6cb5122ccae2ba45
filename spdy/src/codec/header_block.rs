use bytes::{Buf, BufMut, BytesMut};
use indexmap::IndexMap;
use std::fmt;
use url::Url;

/// An ordered, decoded header block.
///
/// Pseudo headers (`:method`, `:scheme`, `:authority`, `:path`, `:status`)
/// are stored alongside regular fields, in insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    fields: IndexMap<String, String>,
}

/// A header block could not be (de)compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("header block compression error")]
pub struct CompressionError;

/// Header (de)compression, the seam where HPACK plugs in.
///
/// Implementations keep whatever connection-scoped state they need; one
/// codec instance is owned by each session.
pub trait HeaderCodec: Send {
    fn encode(&mut self, block: &HeaderBlock, dst: &mut BytesMut) -> Result<(), CompressionError>;

    fn decode(&mut self, src: &[u8]) -> Result<HeaderBlock, CompressionError>;
}

/// Uncompressed header encoding: each field is a big endian `u32` name
/// length, the name, a `u32` value length and the value.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHeaderCodec;

impl HeaderBlock {
    pub fn new() -> HeaderBlock {
        HeaderBlock::default()
    }

    /// Request headers for `method` on `url`.
    pub fn request(method: &str, url: &Url) -> HeaderBlock {
        let mut block = HeaderBlock::new();
        block.insert(":method", method);
        block.insert(":scheme", url.scheme());
        block.insert(":authority", authority(url));

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        block.insert(":path", path);
        block
    }

    pub fn response(status: u16) -> HeaderBlock {
        let mut block = HeaderBlock::new();
        block.insert(":status", status.to_string());
        block
    }

    pub fn insert<N, V>(&mut self, name: N, value: V) -> Option<String>
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn status(&self) -> Option<u16> {
        self.get(":status").and_then(|s| s.parse().ok())
    }

    /// The url a request block addresses, built from its pseudo headers.
    pub fn url(&self) -> Option<Url> {
        let scheme = self.get(":scheme")?;
        let authority = self.get(":authority")?;
        let path = self.get(":path").unwrap_or("/");

        Url::parse(&format!("{}://{}{}", scheme, authority, path)).ok()
    }
}

fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

impl fmt::Debug for HeaderBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl HeaderCodec for PlainHeaderCodec {
    fn encode(&mut self, block: &HeaderBlock, dst: &mut BytesMut) -> Result<(), CompressionError> {
        for (name, value) in block.iter() {
            dst.put_u32(name.len() as u32);
            dst.put_slice(name.as_bytes());
            dst.put_u32(value.len() as u32);
            dst.put_slice(value.as_bytes());
        }
        Ok(())
    }

    fn decode(&mut self, mut src: &[u8]) -> Result<HeaderBlock, CompressionError> {
        let mut block = HeaderBlock::new();

        while src.has_remaining() {
            let name = read_string(&mut src)?;
            let value = read_string(&mut src)?;
            block.insert(name, value);
        }

        Ok(block)
    }
}

fn read_string(src: &mut &[u8]) -> Result<String, CompressionError> {
    if src.remaining() < 4 {
        return Err(CompressionError);
    }
    let len = src.get_u32() as usize;
    if src.remaining() < len {
        return Err(CompressionError);
    }

    let raw = src[..len].to_vec();
    src.advance(len);
    String::from_utf8(raw).map_err(|_| CompressionError)
}
