use std::fmt;

macro_rules! unpack_octets_4 {
    ($buf:expr, $offset:expr, $tip:ty) => {
        (($buf[$offset + 0] as $tip) << 24)
            | (($buf[$offset + 1] as $tip) << 16)
            | (($buf[$offset + 2] as $tip) << 8)
            | (($buf[$offset + 3] as $tip) << 0)
    };
}

mod data;
mod go_away;
mod head;
mod headers;
mod ping;
mod reason;
mod reset;
mod settings;
mod stream_id;
mod util;
mod window_update;

pub use self::data::Data;
pub use self::go_away::GoAway;
pub use self::head::{Head, Kind};
pub use self::headers::{Continuation, Headers, PushPromise};
pub use self::ping::Ping;
pub use self::reason::Reason;
pub use self::reset::Reset;
pub use self::settings::Settings;
pub use self::stream_id::{StreamId, StreamIdOverflow};
pub use self::window_update::WindowUpdate;

pub use self::settings::{
    DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, MAX_INITIAL_WINDOW_SIZE,
    MAX_MAX_FRAME_SIZE,
};

pub type FrameSize = u32;

pub const HEADER_LEN: usize = 9;

/// The connection preface a client writes before its first SETTINGS frame.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Eq, PartialEq)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    PushPromise(PushPromise),
    Settings(Settings),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    Reset(Reset),
    /// A frame type this stack does not know, kept so the session can
    /// validate the stream id it was sent on.
    Unknown(Head),
}

impl Frame {
    /// The stream this frame is addressed to. Connection-level frames
    /// report stream zero.
    pub fn stream_id(&self) -> StreamId {
        use self::Frame::*;

        match *self {
            Data(ref frame) => frame.stream_id(),
            Headers(ref frame) => frame.stream_id(),
            PushPromise(ref frame) => frame.stream_id(),
            Reset(ref frame) => frame.stream_id(),
            WindowUpdate(ref frame) => frame.stream_id(),
            Unknown(ref head) => head.stream_id(),
            Settings(_) | Ping(_) | GoAway(_) => StreamId::ZERO,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::Frame::*;

        match *self {
            Data(ref frame) => fmt::Debug::fmt(frame, fmt),
            Headers(ref frame) => fmt::Debug::fmt(frame, fmt),
            PushPromise(ref frame) => fmt::Debug::fmt(frame, fmt),
            Settings(ref frame) => fmt::Debug::fmt(frame, fmt),
            Ping(ref frame) => fmt::Debug::fmt(frame, fmt),
            GoAway(ref frame) => fmt::Debug::fmt(frame, fmt),
            WindowUpdate(ref frame) => fmt::Debug::fmt(frame, fmt),
            Reset(ref frame) => fmt::Debug::fmt(frame, fmt),
            Unknown(ref head) => fmt
                .debug_struct("Unknown")
                .field("kind", &head.kind())
                .field("stream_id", &head.stream_id())
                .finish(),
        }
    }
}

/// Errors raised while parsing or serializing frames.
///
/// These are the framer-level failures. The session translates them into
/// a [`ProtocolError`](crate::ProtocolError) detail and a crate [`Error`](crate::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid control frame")]
    InvalidControlFrame,

    #[error("invalid control frame size")]
    InvalidControlFrameSize,

    #[error("invalid data frame flags")]
    InvalidDataFrameFlags,

    #[error("invalid control frame flags")]
    InvalidControlFrameFlags,

    #[error("unexpected frame")]
    UnexpectedFrame,

    #[error("corrupt GOAWAY frame")]
    GoAwayFrameCorrupt,

    #[error("corrupt RST_STREAM frame")]
    RstStreamFrameCorrupt,

    #[error("invalid padding")]
    InvalidPadding,

    #[error("invalid stream id")]
    InvalidStreamId,

    #[error("invalid setting value")]
    InvalidSettingValue,

    #[error("header block decompression failed")]
    DecompressFailure,

    #[error("header block compression failed")]
    CompressFailure,

    #[error("control frame payload too large")]
    ControlPayloadTooLarge,
}
