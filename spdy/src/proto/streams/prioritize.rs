use bytes::Bytes;
use std::collections::VecDeque;

use super::*;

/// Request priority. Higher variants are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Idle,
    Lowest,
    Low,
    Medium,
    Highest,
}

pub(crate) const NUM_PRIORITIES: usize = 5;

impl Priority {
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// All priorities, highest first.
    pub(crate) fn descending() -> impl Iterator<Item = Priority> {
        use self::Priority::*;

        [Highest, Medium, Low, Lowest, Idle].iter().copied()
    }
}

impl Default for Priority {
    fn default() -> Priority {
        Priority::Medium
    }
}

/// A stream frame waiting in the write queue.
///
/// The stream id is filled in when the frame is written, since ids are only
/// assigned as HEADERS go out.
#[derive(Debug)]
pub(crate) enum StreamFrame {
    Headers { block: HeaderBlock, end_stream: bool },
    Data { payload: Bytes, end_stream: bool },
}

#[derive(Debug)]
pub(crate) enum Next {
    Control(Frame),
    Stream(StreamRef, StreamFrame),
}

/// What was dropped from the write queue for a stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Removed {
    /// DATA payload bytes, whose send credit goes back to the session.
    pub data: usize,
    pub headers: bool,
}

/// The write queue and the session send stall queue.
///
/// Control frames always go first. Stream frames follow stream priority
/// and leave in arrival order within one priority. Streams stalled on the
/// session send window are resumed highest priority first.
#[derive(Debug, Default)]
pub(crate) struct Prioritize {
    control: VecDeque<Frame>,
    pending_send: [VecDeque<(StreamRef, StreamFrame)>; NUM_PRIORITIES],
    stalled: [VecDeque<StreamRef>; NUM_PRIORITIES],
}

impl Prioritize {
    pub fn new() -> Prioritize {
        Prioritize::default()
    }

    pub fn queue_control(&mut self, frame: Frame) {
        tracing::trace!("queue_control; frame={:?}", frame);
        self.control.push_back(frame);
    }

    pub fn queue_frame(&mut self, stream: StreamRef, priority: Priority, frame: StreamFrame) {
        self.pending_send[priority.index()].push_back((stream, frame));
    }

    pub fn pop_frame(&mut self) -> Option<Next> {
        if let Some(frame) = self.control.pop_front() {
            return Some(Next::Control(frame));
        }

        for priority in Priority::descending() {
            if let Some((stream, frame)) = self.pending_send[priority.index()].pop_front() {
                return Some(Next::Stream(stream, frame));
            }
        }

        None
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        !self.control.is_empty() || self.pending_send.iter().any(|queue| !queue.is_empty())
    }

    /// Drop every queued frame of `stream`.
    pub fn remove_for_stream(&mut self, stream: StreamRef, priority: Priority) -> Removed {
        let mut removed = Removed::default();

        self.pending_send[priority.index()].retain(|(key, frame)| {
            if *key != stream {
                return true;
            }

            match frame {
                StreamFrame::Headers { .. } => removed.headers = true,
                StreamFrame::Data { payload, .. } => removed.data += payload.len(),
            }
            false
        });

        if removed != Removed::default() {
            tracing::trace!("remove_for_stream; removed={:?}", removed);
        }

        removed
    }

    /// Drop every queued stream frame, keeping control frames.
    pub fn clear_streams(&mut self) {
        for queue in self.pending_send.iter_mut() {
            queue.clear();
        }
        for queue in self.stalled.iter_mut() {
            queue.clear();
        }
    }

    /// Park a stream until the session send window opens up.
    pub fn stall(&mut self, stream: StreamRef, priority: Priority) {
        tracing::trace!("stall on session window; priority={:?}", priority);
        self.stalled[priority.index()].push_back(stream);
    }

    /// The highest priority stream waiting on the session window.
    pub fn pop_stalled(&mut self) -> Option<StreamRef> {
        for priority in Priority::descending() {
            if let Some(stream) = self.stalled[priority.index()].pop_front() {
                return Some(stream);
            }
        }

        None
    }

    pub fn remove_stalled(&mut self, stream: StreamRef, priority: Priority) {
        self.stalled[priority.index()].retain(|key| *key != stream);
    }

    pub fn num_stalled(&self) -> usize {
        self.stalled.iter().map(VecDeque::len).sum()
    }
}
