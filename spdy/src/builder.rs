use futures_util::io::{AsyncRead, AsyncWrite};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::{HeaderCodec, PlainHeaderCodec};
use crate::frame::StreamId;
use crate::key::SessionKey;
use crate::proto::{Config, PushAuthorizer, SameOriginPolicy, ServerSettingsCache, Session};

/// Configures and starts a [`Session`].
///
/// ```
/// use spdy::{Builder, SessionKey};
/// # fn io() -> futures::io::Cursor<Vec<u8>> { futures::io::Cursor::new(Vec::new()) }
///
/// let session = Builder::new()
///     .initial_window_size(1 << 20)
///     .session_max_recv_window(10 << 20)
///     .enable_push(false)
///     .handshake(SessionKey::new("www.example.org", 443), io());
/// assert!(session.is_available());
/// ```
pub struct Builder {
    config: Config,
    trusted_proxy: bool,
    settings_cache: ServerSettingsCache,
    push_authorizer: Option<Box<dyn PushAuthorizer>>,
    header_codec: Option<Box<dyn HeaderCodec>>,
    clock: Option<crate::proto::Clock>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            config: Config::default(),
            trusted_proxy: false,
            settings_cache: ServerSettingsCache::new(),
            push_authorizer: None,
            header_codec: None,
            clock: None,
        }
    }

    /// Receive window advertised for every stream.
    pub fn initial_window_size(&mut self, size: u32) -> &mut Self {
        self.config.initial_window_size = size;
        self
    }

    /// Receive window of the session as a whole. Values above 65535 are
    /// announced with a WINDOW_UPDATE right after the SETTINGS.
    pub fn session_max_recv_window(&mut self, size: u32) -> &mut Self {
        self.config.session_max_recv_window = size;
        self
    }

    /// Ceiling for any MAX_CONCURRENT_STREAMS the server announces.
    pub fn max_concurrent_streams_limit(&mut self, max: usize) -> &mut Self {
        self.config.max_concurrent_streams_limit = max;
        self
    }

    /// Concurrency assumed until the server says otherwise, unless the
    /// settings cache remembers a value for the server.
    pub fn initial_max_concurrent_streams(&mut self, max: usize) -> &mut Self {
        self.config.initial_max_concurrent_streams = max;
        self
    }

    pub fn max_concurrent_pushed_streams(&mut self, max: usize) -> &mut Self {
        self.config.max_concurrent_pushed_streams = max;
        self
    }

    /// Beyond this, the oldest unclaimed push is reset.
    pub fn max_unclaimed_pushed_streams(&mut self, max: usize) -> &mut Self {
        self.config.max_unclaimed_pushed_streams = max;
        self
    }

    pub fn pushed_stream_lifetime(&mut self, dur: Duration) -> &mut Self {
        self.config.pushed_stream_lifetime = dur;
        self
    }

    pub fn enable_push(&mut self, enabled: bool) -> &mut Self {
        self.config.enable_push = enabled;
        self
    }

    /// How long a session with unanswered pings may stay silent before it
    /// is closed with [`Error::Timeout`](crate::Error::Timeout).
    pub fn hung_interval(&mut self, dur: Duration) -> &mut Self {
        self.config.hung_interval = dur;
        self
    }

    /// Silence after which new request HEADERS are preceded by a PING.
    pub fn connection_at_risk_of_loss(&mut self, dur: Duration) -> &mut Self {
        self.config.connection_at_risk_of_loss = dur;
        self
    }

    /// The read loop yields after this many bytes...
    pub fn yield_after_bytes(&mut self, bytes: usize) -> &mut Self {
        self.config.yield_after_bytes = bytes;
        self
    }

    /// ...or after this much time, whichever comes first.
    pub fn yield_after_duration(&mut self, dur: Duration) -> &mut Self {
        self.config.yield_after_duration = dur;
        self
    }

    /// Largest DATA payload produced in one frame. Never more than the
    /// peer's maximum frame size.
    pub fn max_send_chunk(&mut self, max: usize) -> &mut Self {
        self.config.max_send_chunk = max;
        self
    }

    /// Largest header block accepted from the peer, announced in the
    /// initial SETTINGS. A larger block closes the session with
    /// [`Error::FrameSize`](crate::Error::FrameSize).
    pub fn max_header_list_size(&mut self, max: u32) -> &mut Self {
        self.config.max_header_list_size = max as usize;
        self
    }

    /// Id of the first local stream.
    ///
    /// # Panics
    ///
    /// Panics if `stream_id` is not a client initiated id.
    pub fn initial_stream_id(&mut self, stream_id: u32) -> &mut Self {
        let stream_id = StreamId::from(stream_id);
        assert!(
            stream_id.is_client_initiated(),
            "stream id must be odd, if client"
        );
        self.config.initial_stream_id = stream_id;
        self
    }

    /// Share a settings cache between sessions.
    pub fn settings_cache(&mut self, cache: ServerSettingsCache) -> &mut Self {
        self.settings_cache = cache;
        self
    }

    /// Accept pushes from a trusted proxy for any http origin.
    pub fn trusted_proxy(&mut self, trusted: bool) -> &mut Self {
        self.trusted_proxy = trusted;
        self
    }

    /// Replace the default same origin push policy.
    pub fn push_authorizer<A>(&mut self, authorizer: A) -> &mut Self
    where
        A: PushAuthorizer + 'static,
    {
        self.push_authorizer = Some(Box::new(authorizer));
        self
    }

    pub fn header_codec<C>(&mut self, codec: C) -> &mut Self
    where
        C: HeaderCodec + 'static,
    {
        self.header_codec = Some(Box::new(codec));
        self
    }

    /// Time source for timers. Defaults to [`Instant::now`].
    pub fn clock<F>(&mut self, clock: F) -> &mut Self
    where
        F: Fn() -> Instant + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Start a session over `io`.
    ///
    /// The preface and initial SETTINGS are queued and go out on the first
    /// [`poll`](Session::poll). A push authorizer or header codec set on
    /// this builder is moved into the session; later handshakes fall back
    /// to the defaults.
    pub fn handshake<T>(&mut self, key: SessionKey, io: T) -> Session<T>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::debug!("handshake; key={}", key);

        let authorizer = self
            .push_authorizer
            .take()
            .unwrap_or_else(|| Box::new(SameOriginPolicy::new(self.trusted_proxy)));
        let header_codec = self
            .header_codec
            .take()
            .unwrap_or_else(|| Box::new(PlainHeaderCodec));
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(Instant::now));

        Session::new(
            key,
            io,
            header_codec,
            self.config.clone(),
            self.settings_cache.clone(),
            authorizer,
            clock,
        )
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Builder")
            .field("config", &self.config)
            .field("trusted_proxy", &self.trusted_proxy)
            .field("settings_cache", &self.settings_cache)
            .finish()
    }
}
