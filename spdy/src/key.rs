use std::fmt;
use url::Url;

/// Identifies the endpoint a session is connected to.
///
/// Two sessions with equal keys are interchangeable from the caller's point
/// of view. Privacy mode separates otherwise identical keys so that
/// credentialed and uncredentialed traffic never share a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    host: String,
    port: u16,
    proxy: Option<String>,
    privacy_mode: bool,
}

impl SessionKey {
    pub fn new<H: Into<String>>(host: H, port: u16) -> SessionKey {
        SessionKey {
            host: host.into(),
            port,
            proxy: None,
            privacy_mode: false,
        }
    }

    /// The key for the origin of `url`. Returns `None` for urls without a
    /// host.
    pub fn from_url(url: &Url) -> Option<SessionKey> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(SessionKey::new(host, port))
    }

    pub fn with_proxy<P: Into<String>>(mut self, proxy: P) -> SessionKey {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_privacy_mode(mut self, enabled: bool) -> SessionKey {
        self.privacy_mode = enabled;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn privacy_mode(&self) -> bool {
        self.privacy_mode
    }

    /// Whether `url` is same-origin with this key's endpoint, ignoring
    /// scheme.
    pub fn matches_origin(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host.as_str()) && url.port_or_known_default() == Some(self.port)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)?;
        if let Some(ref proxy) = self.proxy {
            write!(fmt, " via {}", proxy)?;
        }
        if self.privacy_mode {
            fmt.write_str(" [private]")?;
        }
        Ok(())
    }
}
