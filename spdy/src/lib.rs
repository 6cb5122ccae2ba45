//! Client side session engine for SPDY style multiplexed connections,
//! speaking the HTTP/2 frame format.
//!
//! A [`Session`] owns one transport and multiplexes many request streams
//! over it. It enforces the peer's concurrency limit, queueing requests
//! that do not fit yet, keeps both directions of flow control honest,
//! accepts and tracks server pushes, and tears everything down in an
//! orderly fashion on GOAWAY or errors.
//!
//! The session is sans-executor: all work happens inside
//! [`Session::poll`], which must be polled until it resolves. Stream owners
//! read their streams through [`Session::poll_event`].
//!
//! ```
//! use spdy::{CreateStream, HeaderBlock, Priority, Session, SessionKey};
//! use url::Url;
//!
//! # fn main() -> Result<(), spdy::Error> {
//! # let io = futures::io::Cursor::new(Vec::new());
//! let url = Url::parse("https://www.example.org/").unwrap();
//! let mut session = Session::builder().handshake(SessionKey::new("www.example.org", 443), io);
//!
//! if let CreateStream::Ready(stream) = session.create_stream(url.clone(), Priority::Medium)? {
//!     session.send_headers(stream, HeaderBlock::request("GET", &url), true)?;
//! }
//! # Ok(())
//! # }
//! ```

macro_rules! proto_err {
    (conn: $($msg:tt)+) => {
        tracing::debug!("connection error PROTOCOL_ERROR -- {};", format_args!($($msg)+))
    };
    (stream: $($msg:tt)+) => {
        tracing::debug!("stream error PROTOCOL_ERROR -- {};", format_args!($($msg)+))
    };
}

macro_rules! ready {
    ($e:expr) => {
        match $e {
            ::std::task::Poll::Ready(r) => r,
            ::std::task::Poll::Pending => return ::std::task::Poll::Pending,
        }
    };
}

mod builder;
pub mod codec;
mod error;
pub mod frame;
mod key;
mod proto;

pub use crate::builder::Builder;
pub use crate::codec::{CompressionError, HeaderBlock, HeaderCodec, PlainHeaderCodec, UserError};
pub use crate::error::{Error, ProtocolError};
pub use crate::frame::{Reason, StreamId};
pub use crate::key::SessionKey;
pub use crate::proto::{
    Availability, CreateStream, Priority, PushAuthorizer, RequestId, SameOriginPolicy,
    ServerSettingsCache, Session, SessionEvent, StreamEvent, StreamRef, StreamState, WindowSize,
};
