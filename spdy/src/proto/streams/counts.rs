use std::cmp;

use super::*;

/// Stream counters and the limits they are checked against.
///
/// `num_active` includes pushed streams from the moment their PUSH_PROMISE
/// is accepted. Pushed streams are subtracted again when deciding whether a
/// new local stream fits, so accepting pushes never eats into the request
/// concurrency. `num_active_pushed` only counts pushes whose response
/// headers have arrived.
#[derive(Debug)]
pub(crate) struct Counts {
    max_concurrent_streams: usize,
    max_concurrent_streams_limit: usize,
    max_concurrent_pushed_streams: usize,
    num_active: usize,
    num_created: usize,
    num_pushed: usize,
    num_active_pushed: usize,
}

impl Counts {
    pub fn new(config: &Config) -> Self {
        Counts {
            max_concurrent_streams: cmp::min(
                config.initial_max_concurrent_streams,
                config.max_concurrent_streams_limit,
            ),
            max_concurrent_streams_limit: config.max_concurrent_streams_limit,
            max_concurrent_pushed_streams: config.max_concurrent_pushed_streams,
            num_active: 0,
            num_created: 0,
            num_pushed: 0,
            num_active_pushed: 0,
        }
    }

    pub fn can_create_stream(&self) -> bool {
        self.num_active + self.num_created - self.num_pushed < self.max_concurrent_streams
    }

    /// Count a stream handed out but not yet activated.
    pub fn inc_num_created(&mut self, stream: &mut Stream) {
        debug_assert!(!stream.counted.created && !stream.counted.active);

        self.num_created += 1;
        stream.counted.created = true;
    }

    /// The stream's HEADERS are going out and it now has an id.
    pub fn activate(&mut self, stream: &mut Stream) {
        debug_assert!(stream.counted.created);

        self.num_created -= 1;
        self.num_active += 1;
        stream.counted.created = false;
        stream.counted.active = true;
    }

    /// A PUSH_PROMISE was accepted.
    pub fn inc_num_pushed(&mut self, stream: &mut Stream) {
        debug_assert!(!stream.counted.active);

        self.num_active += 1;
        self.num_pushed += 1;
        stream.counted.active = true;
        stream.counted.pushed = true;
    }

    pub fn can_inc_num_active_pushed(&self) -> bool {
        self.num_active_pushed < self.max_concurrent_pushed_streams
    }

    /// Response headers arrived on a reserved push.
    pub fn inc_num_active_pushed(&mut self, stream: &mut Stream) {
        debug_assert!(stream.counted.pushed && !stream.counted.active_pushed);

        self.num_active_pushed += 1;
        stream.counted.active_pushed = true;
    }

    /// Remove every contribution the stream makes.
    pub fn dec_num_streams(&mut self, stream: &mut Stream) {
        tracing::trace!(
            "dec_num_streams; stream={:?}; counted={:?}",
            stream.id,
            stream.counted
        );

        let counted = stream.counted;

        if counted.created {
            self.num_created -= 1;
        }
        if counted.active {
            self.num_active -= 1;
        }
        if counted.pushed {
            self.num_pushed -= 1;
        }
        if counted.active_pushed {
            self.num_active_pushed -= 1;
        }

        stream.counted = Counted::default();
    }

    /// Apply a MAX_CONCURRENT_STREAMS value, clamped to the configured
    /// ceiling. Returns the value now in effect.
    pub fn apply_max_concurrent_streams(&mut self, val: u32) -> usize {
        let val = cmp::min(val as usize, self.max_concurrent_streams_limit);
        tracing::trace!(
            "apply_max_concurrent_streams; old={}; new={}",
            self.max_concurrent_streams,
            val
        );
        self.max_concurrent_streams = val;
        val
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.max_concurrent_streams
    }

    pub fn num_active(&self) -> usize {
        self.num_active
    }

    pub fn num_created(&self) -> usize {
        self.num_created
    }

    pub fn num_pushed(&self) -> usize {
        self.num_pushed
    }

    pub fn num_active_pushed(&self) -> usize {
        self.num_active_pushed
    }

    pub fn has_streams(&self) -> bool {
        self.num_active != 0 || self.num_created != 0
    }
}
