use std::cmp;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{Error, ProtocolError};
use crate::frame::Ping;

/// PING liveness tracking.
///
/// Our pings carry odd ids, the peer's carry even ones. A peer is
/// considered hung once a ping has been outstanding for `hung_interval`
/// and nothing at all has been read for as long.
#[derive(Debug)]
pub(crate) struct PingPong {
    next_id: u64,
    /// Send times of unanswered pings, oldest first.
    in_flight: VecDeque<Instant>,
    hung_interval: Duration,
    at_risk_of_loss: Duration,
}

#[derive(Debug, PartialEq)]
pub(crate) enum ReceivedPing {
    /// The peer's ping, to be echoed.
    MustAck(Ping),
    /// An answer to one of ours.
    Pong,
}

impl PingPong {
    pub fn new(hung_interval: Duration, at_risk_of_loss: Duration) -> Self {
        PingPong {
            next_id: 1,
            in_flight: VecDeque::new(),
            hung_interval,
            at_risk_of_loss,
        }
    }

    pub fn send_ping(&mut self, now: Instant) -> Ping {
        let id = self.next_id;
        self.next_id += 2;
        self.in_flight.push_back(now);

        tracing::trace!("send PING; id={}; in_flight={}", id, self.in_flight.len());
        Ping::new(id)
    }

    pub fn recv_ping(&mut self, ping: Ping) -> Result<ReceivedPing, Error> {
        if !ping.is_ack() {
            tracing::trace!("recv PING; id={}", ping.id());
            return Ok(ReceivedPing::MustAck(Ping::pong(ping.id())));
        }

        if self.in_flight.pop_front().is_none() {
            proto_err!(conn: "recv PING ack that we never sent; id={}", ping.id());
            return Err(Error::Protocol(ProtocolError::FailedPing));
        }

        tracing::trace!(
            "recv PING ack; id={}; in_flight={}",
            ping.id(),
            self.in_flight.len()
        );
        Ok(ReceivedPing::Pong)
    }

    /// Whether the connection has been quiet long enough that a ping
    /// should go out before new work is put on it.
    pub fn should_send_preface_ping(&self, now: Instant, last_read: Instant) -> bool {
        self.in_flight.is_empty() && now.saturating_duration_since(last_read) > self.at_risk_of_loss
    }

    /// Fails with [`Error::Timeout`] once the peer looks hung.
    ///
    /// Silence is counted from the later of the last read and the oldest
    /// unanswered ping, so a ping always gets a full `hung_interval` to be
    /// answered.
    pub fn check(&self, now: Instant, last_read: Instant) -> Result<(), Error> {
        let oldest = match self.in_flight.front() {
            Some(&sent) => sent,
            None => return Ok(()),
        };

        let quiet = now.saturating_duration_since(cmp::max(last_read, oldest));
        if quiet > self.hung_interval {
            tracing::debug!(
                "ping timed out; in_flight={}; quiet={:?}",
                self.in_flight.len(),
                quiet
            );
            return Err(Error::Timeout);
        }

        Ok(())
    }

    pub fn pings_in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
