//! # palaver-store
//!
//! Local persistence for the Palaver widget. The crate exposes a synchronous
//! [`KeyValueStore`] capability (Web-Storage-shaped: get/set/remove plus key
//! enumeration) and typed stores layered on top of it: the per-conversation
//! offline message queue, the per-workspace session record, and the cached
//! contact id.
//!
//! Every component writes only to keys it owns: `offline_queue::{conversation}`
//! for queues, `session::{workspace}` for sessions, `identity::contactId` for
//! the identity cache. Persistence failures degrade — they are logged and the
//! widget keeps running on an in-memory store for the rest of the session;
//! they are never surfaced to the embedding UI.

pub mod identity;
pub mod kv;
pub mod models;
pub mod queue;
pub mod sessions;
pub mod sqlite;

mod error;

pub use error::StoreError;
pub use identity::IdentityCache;
pub use kv::{FallbackStore, KeyValueStore, MemoryStore};
pub use models::{QueuedMessage, Session};
pub use queue::OfflineMessageQueue;
pub use sessions::SessionStore;
pub use sqlite::SqliteStore;
