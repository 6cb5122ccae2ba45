mod flow_control;
mod go_away;
mod ping_pong;
mod session;
mod settings;
mod streams;

pub use self::session::{Availability, CreateStream, Session, SessionEvent};
pub use self::settings::ServerSettingsCache;
pub use self::streams::{
    Priority, PushAuthorizer, RequestId, SameOriginPolicy, StreamEvent, StreamRef, StreamState,
};

pub(crate) use self::flow_control::{RecvWindow, SendWindow};
pub(crate) use self::go_away::GoAway;
pub(crate) use self::ping_pong::PingPong;
pub(crate) use self::session::Clock;

use std::time::Duration;

use crate::frame::{self, StreamId};

pub type WindowSize = u32;

pub const MAX_WINDOW_SIZE: WindowSize = (1 << 31) - 1;
pub const DEFAULT_INITIAL_WINDOW_SIZE: WindowSize = frame::DEFAULT_INITIAL_WINDOW_SIZE;
pub const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 100;
pub const DEFAULT_MAX_CONCURRENT_STREAMS_LIMIT: usize = 256;
pub const DEFAULT_MAX_CONCURRENT_PUSHED_STREAMS: usize = 1_000;
pub const DEFAULT_MAX_SEND_CHUNK: usize = 2_852;
pub const DEFAULT_MAX_HEADER_LIST_SIZE: usize = 256 * 1_024;

/// Session tunables. Built by [`Builder`](crate::Builder).
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Receive window advertised for each stream.
    pub initial_window_size: WindowSize,
    pub session_max_recv_window: WindowSize,
    pub max_concurrent_streams_limit: usize,
    pub initial_max_concurrent_streams: usize,
    pub max_concurrent_pushed_streams: usize,
    pub max_unclaimed_pushed_streams: usize,
    pub pushed_stream_lifetime: Duration,
    pub enable_push: bool,
    pub hung_interval: Duration,
    pub connection_at_risk_of_loss: Duration,
    pub yield_after_bytes: usize,
    pub yield_after_duration: Duration,
    pub max_send_chunk: usize,
    /// Largest header block accepted from the peer.
    pub max_header_list_size: usize,
    pub initial_stream_id: StreamId,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            session_max_recv_window: DEFAULT_INITIAL_WINDOW_SIZE,
            max_concurrent_streams_limit: DEFAULT_MAX_CONCURRENT_STREAMS_LIMIT,
            initial_max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
            max_concurrent_pushed_streams: DEFAULT_MAX_CONCURRENT_PUSHED_STREAMS,
            max_unclaimed_pushed_streams: DEFAULT_MAX_CONCURRENT_PUSHED_STREAMS,
            pushed_stream_lifetime: Duration::from_secs(300),
            enable_push: true,
            hung_interval: Duration::from_secs(10),
            connection_at_risk_of_loss: Duration::from_secs(10),
            yield_after_bytes: 32 * 1_024,
            yield_after_duration: Duration::from_millis(20),
            max_send_chunk: DEFAULT_MAX_SEND_CHUNK,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
            initial_stream_id: StreamId::from(1),
        }
    }
}
