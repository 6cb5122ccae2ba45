use std::{error, fmt, io};

use crate::frame;

/// Errors produced while reading frames off the transport.
#[derive(Debug)]
pub enum RecvError {
    /// The peer sent bytes the framer could not accept.
    Framer(frame::Error),
    Io(io::Error),
}

/// Errors produced while queueing or writing frames.
#[derive(Debug)]
pub enum SendError {
    User(UserError),
    Framer(frame::Error),
    Io(io::Error),
}

/// Errors caused by misuse of the stream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    InactiveStreamId,
    UnexpectedFrameType,
    PayloadTooBig,
    HeadersAlreadySent,
    HeadersNotSent,
    SendAfterEndStream,
    ReleaseCapacityTooBig,
    OverflowedStreamId,
    MissingUrl,
    UnknownRequest,
}

impl From<io::Error> for RecvError {
    fn from(src: io::Error) -> Self {
        RecvError::Io(src)
    }
}

impl From<frame::Error> for RecvError {
    fn from(src: frame::Error) -> Self {
        RecvError::Framer(src)
    }
}

impl error::Error for RecvError {}

impl fmt::Display for RecvError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::RecvError::*;

        match *self {
            Framer(ref e) => e.fmt(fmt),
            Io(ref e) => e.fmt(fmt),
        }
    }
}

impl error::Error for SendError {}

impl fmt::Display for SendError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::SendError::*;

        match *self {
            User(ref e) => e.fmt(fmt),
            Framer(ref e) => e.fmt(fmt),
            Io(ref e) => e.fmt(fmt),
        }
    }
}

impl From<io::Error> for SendError {
    fn from(src: io::Error) -> Self {
        SendError::Io(src)
    }
}

impl From<UserError> for SendError {
    fn from(src: UserError) -> Self {
        SendError::User(src)
    }
}

impl From<frame::Error> for SendError {
    fn from(src: frame::Error) -> Self {
        SendError::Framer(src)
    }
}

impl error::Error for UserError {}

impl fmt::Display for UserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::UserError::*;

        fmt.write_str(match *self {
            InactiveStreamId => "inactive stream",
            UnexpectedFrameType => "unexpected frame type",
            PayloadTooBig => "payload too big",
            HeadersAlreadySent => "headers already sent on this stream",
            HeadersNotSent => "data sent before headers",
            SendAfterEndStream => "send after end of stream",
            ReleaseCapacityTooBig => "release capacity too big",
            OverflowedStreamId => "stream ID overflowed",
            MissingUrl => "stream has no url",
            UnknownRequest => "unknown stream request",
        })
    }
}
