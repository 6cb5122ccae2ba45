use std::sync::Arc;
use std::{fmt, io};

use crate::codec::{RecvError, SendError, UserError};
use crate::frame::{self, Reason};

/// Errors surfaced to users of a session and its streams.
///
/// Every error a session reports, whether it came from the framer, the
/// transport, the peer or a local decision, is expressed as one of these.
/// The same value may be delivered to many streams at once, so it is cheap
/// to clone.
#[derive(Clone, thiserror::Error)]
pub enum Error {
    /// A malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The peer sent more data than the advertised receive window allowed.
    #[error("flow control error")]
    FlowControl,

    /// A stream was refused by concurrency or push admission limits.
    #[error("stream refused")]
    StreamRefused,

    /// Work was cancelled locally or by a GOAWAY before it was sent.
    #[error("aborted")]
    Aborted,

    /// The session is closed or its transport failed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream handle no longer refers to an open stream.
    #[error("stream closed")]
    StreamClosed,

    /// The peer stopped answering pings.
    #[error("timed out")]
    Timeout,

    #[error("header compression error")]
    Compression,

    #[error("frame size error")]
    FrameSize,

    #[error("inadequate transport security")]
    InadequateSecurity,

    #[error("HTTP/1.1 required")]
    Http11Required,

    /// The peer reset the stream.
    #[error("stream reset by peer: {0}")]
    Reset(Reason),

    /// The peer closed the connection with GOAWAY.
    #[error("connection closed by peer: {0}")]
    GoAway(Reason),

    #[error("user error: {0}")]
    User(UserError),

    #[error("io error: {0}")]
    Io(Arc<io::Error>),
}

/// The detailed reason behind an [`Error::Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
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
    #[error("header decompression failure")]
    DecompressFailure,
    #[error("header compression failure")]
    CompressFailure,
    #[error("control payload too large")]
    ControlPayloadTooLarge,

    /// A RST_STREAM or GOAWAY status received from the peer.
    #[error("status {0:?}")]
    Status(Reason),
    /// A status code outside the registered range.
    #[error("invalid status")]
    InvalidStatus,

    #[error("zero-length WINDOW_UPDATE")]
    ZeroWindowUpdate,
    #[error("frame on a stream that was never opened")]
    IdleStream,
    #[error("invalid push promise")]
    InvalidPush,
    #[error("failed ping")]
    FailedPing,
}

impl From<frame::Error> for ProtocolError {
    fn from(src: frame::Error) -> ProtocolError {
        use crate::frame::Error::*;

        match src {
            InvalidControlFrame => ProtocolError::InvalidControlFrame,
            InvalidControlFrameSize => ProtocolError::InvalidControlFrameSize,
            InvalidDataFrameFlags => ProtocolError::InvalidDataFrameFlags,
            InvalidControlFrameFlags => ProtocolError::InvalidControlFrameFlags,
            UnexpectedFrame => ProtocolError::UnexpectedFrame,
            GoAwayFrameCorrupt => ProtocolError::GoAwayFrameCorrupt,
            RstStreamFrameCorrupt => ProtocolError::RstStreamFrameCorrupt,
            InvalidPadding => ProtocolError::InvalidPadding,
            InvalidStreamId => ProtocolError::InvalidStreamId,
            InvalidSettingValue => ProtocolError::InvalidSettingValue,
            DecompressFailure => ProtocolError::DecompressFailure,
            CompressFailure => ProtocolError::CompressFailure,
            ControlPayloadTooLarge => ProtocolError::ControlPayloadTooLarge,
        }
    }
}

impl ProtocolError {
    /// Classify a RST_STREAM status received from the peer.
    pub fn from_reset(reason: Reason) -> ProtocolError {
        if reason.is_known() {
            ProtocolError::Status(reason)
        } else {
            ProtocolError::InvalidStatus
        }
    }
}

impl From<frame::Error> for Error {
    /// Header (de)compression failures become [`Error::Compression`],
    /// oversized frames [`Error::FrameSize`], everything else a protocol
    /// error carrying the framer detail.
    fn from(src: frame::Error) -> Error {
        use crate::frame::Error::*;

        match src {
            CompressFailure | DecompressFailure => Error::Compression,
            ControlPayloadTooLarge => Error::FrameSize,
            other => Error::Protocol(other.into()),
        }
    }
}

impl Error {
    /// The status to send in a GOAWAY when the session closes with this
    /// error.
    pub fn go_away_reason(&self) -> Reason {
        match *self {
            Error::InadequateSecurity => Reason::INADEQUATE_SECURITY,
            Error::FlowControl => Reason::FLOW_CONTROL_ERROR,
            Error::Protocol(_) => Reason::PROTOCOL_ERROR,
            Error::Compression => Reason::COMPRESSION_ERROR,
            Error::FrameSize => Reason::FRAME_SIZE_ERROR,
            Error::Http11Required => Reason::HTTP_1_1_REQUIRED,
            _ => Reason::PROTOCOL_ERROR,
        }
    }

    /// The error a stream observes when the peer resets it with `reason`.
    pub fn from_reset(reason: Reason) -> Error {
        match reason {
            Reason::REFUSED_STREAM => Error::StreamRefused,
            Reason::HTTP_1_1_REQUIRED => Error::Http11Required,
            Reason::FLOW_CONTROL_ERROR => Error::FlowControl,
            Reason::PROTOCOL_ERROR => Error::Protocol(ProtocolError::from_reset(reason)),
            other => Error::Reset(other),
        }
    }

    /// Whether closing the session with this error warrants telling the
    /// peer with a GOAWAY.
    pub(crate) fn sends_go_away(&self) -> bool {
        !matches!(
            *self,
            Error::ConnectionClosed | Error::Io(_) | Error::Aborted | Error::GoAway(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Error {
        Error::Io(Arc::new(src))
    }
}

impl From<ProtocolError> for Error {
    fn from(src: ProtocolError) -> Error {
        Error::Protocol(src)
    }
}

impl From<UserError> for Error {
    fn from(src: UserError) -> Error {
        Error::User(src)
    }
}

impl From<RecvError> for Error {
    fn from(src: RecvError) -> Error {
        match src {
            RecvError::Framer(e) => e.into(),
            RecvError::Io(e) => e.into(),
        }
    }
}

impl From<SendError> for Error {
    fn from(src: SendError) -> Error {
        match src {
            SendError::User(e) => e.into(),
            SendError::Framer(e) => e.into(),
            SendError::Io(e) => e.into(),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        use self::Error::*;

        match (self, other) {
            (Protocol(a), Protocol(b)) => a == b,
            (Reset(a), Reset(b)) => a == b,
            (GoAway(a), GoAway(b)) => a == b,
            (User(a), User(b)) => a == b,
            (Io(a), Io(b)) => a.kind() == b.kind(),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;

        match *self {
            Protocol(ref e) => fmt.debug_tuple("Protocol").field(e).finish(),
            Reset(ref r) => fmt.debug_tuple("Reset").field(r).finish(),
            GoAway(ref r) => fmt.debug_tuple("GoAway").field(r).finish(),
            User(ref e) => fmt.debug_tuple("User").field(e).finish(),
            Io(ref e) => fmt.debug_tuple("Io").field(&e.kind()).finish(),
            ref other => write!(fmt, "{}", variant_name(other)),
        }
    }
}

fn variant_name(err: &Error) -> &'static str {
    use self::Error::*;

    match *err {
        FlowControl => "FlowControl",
        StreamRefused => "StreamRefused",
        Aborted => "Aborted",
        ConnectionClosed => "ConnectionClosed",
        StreamClosed => "StreamClosed",
        Timeout => "Timeout",
        Compression => "Compression",
        FrameSize => "FrameSize",
        InadequateSecurity => "InadequateSecurity",
        Http11Required => "Http11Required",
        Protocol(_) => "Protocol",
        Reset(_) => "Reset",
        GoAway(_) => "GoAway",
        User(_) => "User",
        Io(_) => "Io",
    }
}
