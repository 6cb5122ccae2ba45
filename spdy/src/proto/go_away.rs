use bytes::Bytes;

use crate::frame::{self, Reason, StreamId};

/// GOAWAY bookkeeping for both directions.
#[derive(Debug, Default)]
pub(crate) struct GoAway {
    /// The peer's GOAWAY, narrowed by every later one.
    received: Option<GoingAway>,
    /// Our own GOAWAY, once queued.
    sent: Option<GoingAway>,
}

#[derive(Debug, Clone, Copy)]
struct GoingAway {
    last_stream_id: StreamId,
    reason: Reason,
}

impl GoAway {
    pub fn new() -> Self {
        GoAway::default()
    }

    /// Record a GOAWAY from the peer and return the last stream id that is
    /// still allowed to complete.
    ///
    /// A later GOAWAY may lower the id but never raise it again.
    pub fn recv_go_away(&mut self, frame: &frame::GoAway) -> StreamId {
        let last_stream_id = match self.received {
            Some(ref prev) if prev.last_stream_id < frame.last_stream_id() => {
                tracing::debug!(
                    "GOAWAY raised last_stream_id; prev={:?}; new={:?}",
                    prev.last_stream_id,
                    frame.last_stream_id()
                );
                prev.last_stream_id
            }
            _ => frame.last_stream_id(),
        };

        self.received = Some(GoingAway {
            last_stream_id,
            reason: frame.reason(),
        });

        last_stream_id
    }

    /// Build the GOAWAY to send, unless the same one already went out.
    pub fn go_away(
        &mut self,
        last_stream_id: StreamId,
        reason: Reason,
        debug_data: &'static str,
    ) -> Option<frame::GoAway> {
        if let Some(ref sent) = self.sent {
            if sent.last_stream_id == last_stream_id && sent.reason == reason {
                return None;
            }
        }

        self.sent = Some(GoingAway {
            last_stream_id,
            reason,
        });

        Some(frame::GoAway::with_debug_data(
            last_stream_id,
            reason,
            Bytes::from_static(debug_data.as_bytes()),
        ))
    }

    #[cfg(test)]
    pub fn is_going_away(&self) -> bool {
        self.received.is_some() || self.sent.is_some()
    }

    #[cfg(test)]
    pub fn received_reason(&self) -> Option<Reason> {
        self.received.map(|g| g.reason)
    }

    #[cfg(test)]
    pub fn sent_reason(&self) -> Option<Reason> {
        self.sent.map(|g| g.reason)
    }
}
