//! The injected persistence capability.
//!
//! The widget core never touches host storage directly; it is handed a
//! [`KeyValueStore`] at construction. [`MemoryStore`] backs tests and
//! storage-less hosts, [`crate::SqliteStore`] backs desktop-class hosts, and
//! [`FallbackStore`] wraps any primary store with the degrade-to-memory
//! policy for persistence failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{Result, StoreError};

/// Synchronous key-value persistence, Web-Storage shaped.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// All stored keys starting with `prefix`, in lexicographic order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory store. Nothing survives the process; used by tests and as the
/// degradation target of [`FallbackStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Wraps a primary store and switches to an in-memory store for the rest of
/// the session on the first persistence error.
///
/// Losing durability is preferable to surfacing storage failures to the
/// widget UI; the switch is logged once and is one-way.
pub struct FallbackStore {
    primary: Box<dyn KeyValueStore>,
    fallback: MemoryStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(primary: Box<dyn KeyValueStore>) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the store has switched to in-memory operation.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, op: &str, err: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(%op, error = %err, "persistence failed, continuing in-memory for this session");
        }
    }
}

impl KeyValueStore for FallbackStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.is_degraded() {
            return self.fallback.get(key);
        }
        match self.primary.get(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.degrade("get", &e);
                self.fallback.get(key)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.is_degraded() {
            return self.fallback.set(key, value);
        }
        match self.primary.set(key, value) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.degrade("set", &e);
                self.fallback.set(key, value)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.is_degraded() {
            return self.fallback.remove(key);
        }
        match self.primary.remove(key) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.degrade("remove", &e);
                self.fallback.remove(key)
            }
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        if self.is_degraded() {
            return self.fallback.keys_with_prefix(prefix);
        }
        match self.primary.keys_with_prefix(prefix) {
            Ok(keys) => Ok(keys),
            Err(e) => {
                self.degrade("keys_with_prefix", &e);
                self.fallback.keys_with_prefix(prefix)
            }
        }
    }
}
