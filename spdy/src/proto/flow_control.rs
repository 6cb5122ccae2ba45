use std::fmt;

use crate::frame::Reason;
use crate::proto::{WindowSize, MAX_WINDOW_SIZE};

const UNACKED_NUMERATOR: i64 = 1;
const UNACKED_DENOMINATOR: i64 = 2;

/// Send-side credit: how many bytes the peer currently lets us send.
///
/// The balance is signed. A SETTINGS frame lowering the initial window can
/// push a stream's window below zero, after which it stays stalled until
/// enough WINDOW_UPDATE credit arrives.
#[derive(Copy, Clone, Debug)]
pub struct SendWindow {
    window_size: Window,
}

/// Receive-side credit.
///
/// `window_size` includes credit we have already granted locally but not
/// yet announced. `unacked` is that not yet announced part, so the peer's
/// view of the window is `window_size - unacked`. Credit is announced in
/// one WINDOW_UPDATE once more than half of `max_window` is pending.
#[derive(Copy, Clone, Debug)]
pub struct RecvWindow {
    window_size: Window,
    unacked: WindowSize,
    max_window: WindowSize,
}

impl SendWindow {
    pub fn new(initial: WindowSize) -> SendWindow {
        SendWindow {
            window_size: Window(initial as i32),
        }
    }

    pub fn window_size(&self) -> Window {
        self.window_size
    }

    /// Stalled windows admit no DATA until increased.
    pub fn is_stalled(&self) -> bool {
        self.window_size.0 <= 0
    }

    /// Bytes that may be sent right now.
    pub fn available(&self) -> WindowSize {
        self.window_size.as_size()
    }

    /// Apply a WINDOW_UPDATE from the peer.
    pub fn inc_window(&mut self, sz: WindowSize) -> Result<(), Reason> {
        let val = self.window_size.0 as i64 + sz as i64;

        if val > MAX_WINDOW_SIZE as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        tracing::trace!(
            "inc_send_window; sz={}; old={}; new={}",
            sz,
            self.window_size,
            val
        );

        self.window_size = Window(val as i32);
        Ok(())
    }

    /// Consume credit for a DATA frame being produced. Callers never ask
    /// for more than `available()`.
    pub fn dec_window(&mut self, sz: WindowSize) {
        tracing::trace!("dec_send_window; sz={}; window={}", sz, self.window_size);
        debug_assert!(sz <= self.window_size);
        self.window_size -= sz;
    }

    /// Return credit for DATA that was produced but never written.
    pub fn return_window(&mut self, sz: WindowSize) {
        tracing::trace!("return_send_window; sz={}; window={}", sz, self.window_size);
        self.window_size += sz;
    }

    /// Shift the window by the change in the peer's initial window size.
    pub fn apply_delta(&mut self, delta: i32) -> Result<(), Reason> {
        let val = self.window_size.0 as i64 + delta as i64;

        if val > MAX_WINDOW_SIZE as i64 || val < i32::MIN as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        tracing::trace!(
            "apply_delta; delta={}; old={}; new={}",
            delta,
            self.window_size,
            val
        );

        self.window_size = Window(val as i32);
        Ok(())
    }
}

impl RecvWindow {
    pub fn new(initial: WindowSize, max_window: WindowSize) -> RecvWindow {
        RecvWindow {
            window_size: Window(initial as i32),
            unacked: 0,
            max_window,
        }
    }

    pub fn window_size(&self) -> Window {
        self.window_size
    }

    pub fn unacked(&self) -> WindowSize {
        self.unacked
    }

    /// Account for `sz` bytes received from the peer.
    ///
    /// Fails when the peer sent more than the window it has been told
    /// about; credit that is still unannounced does not count.
    pub fn dec_window(&mut self, sz: WindowSize) -> Result<(), Reason> {
        let advertised = self.window_size.0 as i64 - self.unacked as i64;

        if sz as i64 > advertised {
            tracing::debug!(
                "recv window violated; sz={}; window={}; unacked={}",
                sz,
                self.window_size,
                self.unacked
            );
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        tracing::trace!("dec_recv_window; sz={}; window={}", sz, self.window_size);

        self.window_size -= sz;
        Ok(())
    }

    /// Grant `sz` bytes of credit back to the peer.
    ///
    /// Returns the increment to announce with a WINDOW_UPDATE once enough
    /// credit has accumulated.
    pub fn inc_window(&mut self, sz: WindowSize) -> Option<WindowSize> {
        self.window_size += sz;
        self.unacked += sz;

        tracing::trace!(
            "inc_recv_window; sz={}; window={}; unacked={}",
            sz,
            self.window_size,
            self.unacked
        );

        let threshold = self.max_window as i64 / UNACKED_DENOMINATOR * UNACKED_NUMERATOR;
        if self.unacked as i64 > threshold {
            let increment = self.unacked;
            self.unacked = 0;
            Some(increment)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Window(i32);

impl Window {
    pub fn as_size(&self) -> WindowSize {
        if self.0 < 0 {
            0
        } else {
            self.0 as WindowSize
        }
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl PartialEq<WindowSize> for Window {
    fn eq(&self, other: &WindowSize) -> bool {
        if self.0 < 0 {
            false
        } else {
            (self.0 as WindowSize).eq(other)
        }
    }
}

impl PartialOrd<WindowSize> for Window {
    fn partial_cmp(&self, other: &WindowSize) -> Option<::std::cmp::Ordering> {
        if self.0 < 0 {
            Some(::std::cmp::Ordering::Less)
        } else {
            (self.0 as WindowSize).partial_cmp(other)
        }
    }
}

impl PartialOrd<Window> for WindowSize {
    fn partial_cmp(&self, other: &Window) -> Option<::std::cmp::Ordering> {
        if other.0 < 0 {
            Some(::std::cmp::Ordering::Greater)
        } else {
            self.partial_cmp(&(other.0 as WindowSize))
        }
    }
}

impl PartialEq<Window> for WindowSize {
    fn eq(&self, other: &Window) -> bool {
        other.eq(self)
    }
}

impl ::std::ops::SubAssign<WindowSize> for Window {
    fn sub_assign(&mut self, other: WindowSize) {
        self.0 -= other as i32;
    }
}

impl ::std::ops::AddAssign<WindowSize> for Window {
    fn add_assign(&mut self, other: WindowSize) {
        self.0 += other as i32;
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Window> for i32 {
    fn from(w: Window) -> i32 {
        w.0
    }
}
