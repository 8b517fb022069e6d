//! The hosting environment capability.
//!
//! Network-presence and background-sync registration come from whatever is
//! embedding the widget. Injecting them keeps the core free of host
//! globals and runnable in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

/// What the widget consumes from its host.
pub trait HostEnvironment: Send + Sync {
    /// Host-reported network absence. When true, sync passes are skipped
    /// outright; the transport is not even tried.
    fn is_offline(&self) -> bool;

    /// Ask the host to wake the widget for a sync attempt once it believes
    /// connectivity is back. Fire-and-forget; hosts without the primitive
    /// simply ignore it.
    fn register_background_sync(&self, tag: &str);
}

/// A host with manually-set network state and recorded sync registrations.
/// Serves tests and embeddings without background-sync support.
#[derive(Default)]
pub struct StaticHost {
    offline: AtomicBool,
    registrations: Mutex<Vec<String>>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn registrations(&self) -> Vec<String> {
        self.registrations.lock().expect("host lock").clone()
    }
}

impl HostEnvironment for StaticHost {
    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    fn register_background_sync(&self, tag: &str) {
        debug!(tag, "background sync registered");
        self.registrations
            .lock()
            .expect("host lock")
            .push(tag.to_string());
    }
}
