use indexmap::IndexMap;
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

use super::*;

/// Decides whether the peer may push a resource.
pub trait PushAuthorizer: Send {
    /// `associated` is the url of the request the push rides on.
    fn is_authorized(&self, key: &SessionKey, associated: &Url, pushed: &Url) -> bool;
}

/// The default policy: pushes must be same-origin with the request they are
/// associated with. A trusted proxy may additionally push plain `http`
/// resources for any origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameOriginPolicy {
    trusted_proxy: bool,
}

impl SameOriginPolicy {
    pub fn new(trusted_proxy: bool) -> SameOriginPolicy {
        SameOriginPolicy { trusted_proxy }
    }
}

impl PushAuthorizer for SameOriginPolicy {
    fn is_authorized(&self, _key: &SessionKey, associated: &Url, pushed: &Url) -> bool {
        match pushed.scheme() {
            "http" | "https" => {}
            _ => return false,
        }

        if associated.origin() == pushed.origin() {
            return true;
        }

        self.trusted_proxy && pushed.scheme() == "http"
    }
}

/// Pushed streams nobody has claimed yet, keyed by url.
///
/// Insertion order is kept so the oldest entry is the first one.
pub(crate) struct PushRegistry {
    entries: IndexMap<Url, Entry>,
    max_unclaimed: usize,
    lifetime: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    stream: StreamRef,
    promised_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refused {
    Duplicate,
}

impl PushRegistry {
    pub fn new(max_unclaimed: usize, lifetime: Duration) -> PushRegistry {
        PushRegistry {
            entries: IndexMap::new(),
            max_unclaimed,
            lifetime,
        }
    }

    /// Track a newly promised stream.
    ///
    /// Returns the stream evicted to stay within the unclaimed limit, if
    /// any. The caller resets it.
    pub fn register(
        &mut self,
        url: Url,
        stream: StreamRef,
        now: Instant,
    ) -> Result<Option<StreamRef>, Refused> {
        if self.entries.contains_key(&url) {
            tracing::debug!("duplicate pushed url; url={}", url);
            return Err(Refused::Duplicate);
        }

        let mut evicted = None;
        if self.entries.len() >= self.max_unclaimed {
            if let Some((url, entry)) = self.entries.shift_remove_index(0) {
                tracing::trace!("evict oldest unclaimed push; url={}", url);
                evicted = Some(entry.stream);
            }
        }

        self.entries.insert(
            url,
            Entry {
                stream,
                promised_at: now,
            },
        );

        Ok(evicted)
    }

    /// Hand over the push for `url` unless it is missing or expired.
    pub fn claim(&mut self, url: &Url, now: Instant) -> Option<StreamRef> {
        let entry = self.entries.get(url)?;
        if self.is_expired(entry, now) {
            return None;
        }
        self.entries.shift_remove(url).map(|entry| entry.stream)
    }

    /// Remove every entry past its lifetime.
    pub fn expire(&mut self, now: Instant) -> Vec<StreamRef> {
        let lifetime = self.lifetime;
        let mut expired = Vec::new();

        self.entries.retain(|url, entry| {
            if now.saturating_duration_since(entry.promised_at) >= lifetime {
                tracing::trace!("expire unclaimed push; url={}", url);
                expired.push(entry.stream);
                false
            } else {
                true
            }
        });

        expired
    }

    /// Drop the entry for `url` if it still refers to `stream`.
    pub fn remove(&mut self, url: &Url, stream: StreamRef) -> bool {
        match self.entries.get(url) {
            Some(entry) if entry.stream == stream => {
                self.entries.shift_remove(url);
                true
            }
            _ => false,
        }
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<StreamRef> {
        self.entries.drain(..).map(|(_, entry)| entry.stream).collect()
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.promised_at) >= self.lifetime
    }
}

impl fmt::Debug for PushRegistry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PushRegistry")
            .field("unclaimed", &self.entries.keys().collect::<Vec<_>>())
            .field("max_unclaimed", &self.max_unclaimed)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
