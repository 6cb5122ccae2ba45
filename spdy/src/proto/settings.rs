use fnv::FnvHashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::key::SessionKey;

/// Remembers the MAX_CONCURRENT_STREAMS each server announced, so a new
/// session to the same server starts out with the right limit.
///
/// Cloning is cheap and clones share the same table. The owner decides the
/// lifetime, typically one cache per network context.
#[derive(Debug, Clone, Default)]
pub struct ServerSettingsCache {
    inner: Arc<Mutex<FnvHashMap<(String, u16), u32>>>,
}

impl ServerSettingsCache {
    pub fn new() -> ServerSettingsCache {
        ServerSettingsCache::default()
    }

    pub fn max_concurrent_streams(&self, key: &SessionKey) -> Option<u32> {
        self.lock().get(&entry_key(key)).copied()
    }

    pub fn set_max_concurrent_streams(&self, key: &SessionKey, val: u32) {
        tracing::trace!("remember max_concurrent_streams; key={}; val={}", key, val);
        self.lock().insert(entry_key(key), val);
    }

    /// Forget everything learned about `host`, on any port.
    pub fn clear_for(&self, host: &str) {
        self.lock().retain(|(entry_host, _), _| entry_host != host);
    }

    /// Forget everything, e.g. after the local IP address changed.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, FnvHashMap<(String, u16), u32>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn entry_key(key: &SessionKey) -> (String, u16) {
    (key.host().to_string(), key.port())
}
