use crate::codec::UserError;
use crate::codec::UserError::*;
use crate::error::ProtocolError;
use crate::frame::Reason;

use self::Inner::*;
use self::Peer::*;

/// Per stream protocol state.
///
/// ```text
///                          +--------+
///                  send PP |        | recv PP
///                 ,--------|  idle  |--------.
///                /         |        |         \
///               v          +--------+          v
///        +----------+          |           +----------+
///        |          |          | send H /  |          |
/// ,------| reserved |          | recv H    | reserved |------.
/// |      | (local)  |          |           | (remote) |      |
/// |      +----------+          v           +----------+      |
/// |          |             +--------+             |          |
/// |          |     recv ES |        | send ES     |          |
/// |   send H |     ,-------|  open  |-------.     | recv H   |
/// |          |    /        |        |        \    |          |
/// |          v   v         +--------+         v   v          |
/// |      +----------+          |           +----------+      |
/// |      |   half   |          |           |   half   |      |
/// |      |  closed  |          | send R /  |  closed  |      |
/// |      | (remote) |          | recv R    | (local)  |      |
/// |      +----------+          |           +----------+      |
/// |           |                |                 |           |
/// |           | send ES /      |       recv ES / |           |
/// |           | send R /       v        send R / |           |
/// |           | recv R     +--------+   recv R   |           |
/// | send R /  `----------->|        |<-----------'  send R / |
/// | recv R                 | closed |               recv R   |
/// `----------------------->|        |<----------------------'
///                          +--------+
/// ```
///
/// Only the client half of the diagram is reachable: streams are opened by
/// sending HEADERS or reserved by a received PUSH_PROMISE.
#[derive(Debug, Clone)]
pub struct State {
    inner: Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inner {
    Idle,
    ReservedRemote,
    Open { local: Peer, remote: Peer },
    HalfClosedLocal(Peer),
    HalfClosedRemote(Peer),
    Closed(Cause),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Peer {
    AwaitingHeaders,
    Streaming,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cause {
    EndStream,
    /// The peer sent RST_STREAM.
    Reset(Reason),
    /// We sent RST_STREAM.
    LocallyReset(Reason),
    /// Closed by a session level event (GOAWAY, connection error).
    Session,
}

/// Public view of a stream's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, no id assigned yet.
    Idle,
    /// Promised by the peer, response headers not received yet.
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl State {
    /// Local HEADERS sent. `eos` when no body follows.
    pub fn send_open(&mut self, eos: bool) -> Result<(), UserError> {
        self.inner = match self.inner {
            Idle => {
                if eos {
                    HalfClosedLocal(AwaitingHeaders)
                } else {
                    Open {
                        local: Streaming,
                        remote: AwaitingHeaders,
                    }
                }
            }
            _ => return Err(HeadersAlreadySent),
        };

        Ok(())
    }

    /// Response headers received from the peer.
    pub fn recv_open(&mut self, eos: bool) -> Result<(), ProtocolError> {
        self.inner = match self.inner {
            ReservedRemote => {
                if eos {
                    Closed(Cause::EndStream)
                } else {
                    HalfClosedLocal(Streaming)
                }
            }
            Open {
                local,
                remote: AwaitingHeaders,
            } => {
                if eos {
                    HalfClosedRemote(local)
                } else {
                    Open {
                        local,
                        remote: Streaming,
                    }
                }
            }
            HalfClosedLocal(AwaitingHeaders) => {
                if eos {
                    Closed(Cause::EndStream)
                } else {
                    HalfClosedLocal(Streaming)
                }
            }
            state => {
                proto_err!(stream: "recv_open: in unexpected state {:?}", state);
                return Err(ProtocolError::UnexpectedFrame);
            }
        };

        Ok(())
    }

    /// The peer reserved this stream with PUSH_PROMISE.
    pub fn reserve_remote(&mut self) -> Result<(), ProtocolError> {
        match self.inner {
            Idle => {
                self.inner = ReservedRemote;
                Ok(())
            }
            state => {
                proto_err!(conn: "reserve_remote: in unexpected state {:?}", state);
                Err(ProtocolError::InvalidPush)
            }
        }
    }

    /// END_STREAM received.
    pub fn recv_close(&mut self) -> Result<(), ProtocolError> {
        match self.inner {
            Open {
                local,
                remote: Streaming,
            } => {
                tracing::trace!("recv_close: Open => HalfClosedRemote({:?})", local);
                self.inner = HalfClosedRemote(local);
                Ok(())
            }
            HalfClosedLocal(Streaming) => {
                tracing::trace!("recv_close: HalfClosedLocal => Closed");
                self.inner = Closed(Cause::EndStream);
                Ok(())
            }
            state => {
                proto_err!(stream: "recv_close: in unexpected state {:?}", state);
                Err(ProtocolError::UnexpectedFrame)
            }
        }
    }

    /// END_STREAM sent.
    pub fn send_close(&mut self) {
        match self.inner {
            Open { remote, .. } => {
                tracing::trace!("send_close: Open => HalfClosedLocal({:?})", remote);
                self.inner = HalfClosedLocal(remote);
            }
            HalfClosedRemote(..) => {
                tracing::trace!("send_close: HalfClosedRemote => Closed");
                self.inner = Closed(Cause::EndStream);
            }
            state => {
                debug_assert!(false, "send_close: unexpected state {:?}", state);
            }
        }
    }

    pub fn set_reset(&mut self, cause: Cause) {
        if !self.is_closed() {
            tracing::trace!("set_reset; cause={:?}; prev={:?}", cause, self.inner);
            self.inner = Closed(cause);
        }
    }

    pub fn cause(&self) -> Option<Cause> {
        match self.inner {
            Closed(cause) => Some(cause),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.inner == Idle
    }

    pub fn is_reserved_remote(&self) -> bool {
        self.inner == ReservedRemote
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.inner, Closed(_))
    }

    /// Whether body data may still be sent.
    pub fn is_send_streaming(&self) -> bool {
        matches!(
            self.inner,
            Open {
                local: Streaming,
                ..
            } | HalfClosedRemote(Streaming)
        )
    }

    /// Whether body data may still be received.
    pub fn is_recv_streaming(&self) -> bool {
        matches!(
            self.inner,
            Open {
                remote: Streaming,
                ..
            } | HalfClosedLocal(Streaming)
        )
    }

    pub fn is_recv_headers(&self) -> bool {
        matches!(
            self.inner,
            ReservedRemote
                | Open {
                    remote: AwaitingHeaders,
                    ..
                }
                | HalfClosedLocal(AwaitingHeaders)
        )
    }

    /// Whether the peer has finished with the stream, so a reset would
    /// tell it nothing.
    pub fn is_remote_closed(&self) -> bool {
        matches!(self.inner, HalfClosedRemote(..) | Closed(_))
    }

    pub fn public(&self) -> StreamState {
        match self.inner {
            Idle => StreamState::Idle,
            ReservedRemote => StreamState::ReservedRemote,
            Open { .. } => StreamState::Open,
            HalfClosedLocal(..) => StreamState::HalfClosedLocal,
            HalfClosedRemote(..) => StreamState::HalfClosedRemote,
            Closed(..) => StreamState::Closed,
        }
    }
}

impl Default for State {
    fn default() -> State {
        State { inner: Inner::Idle }
    }
}
