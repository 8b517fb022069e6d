//! # palaver-shared
//!
//! Types and constants shared across the Palaver widget crates: typed ids,
//! the normalized connection state, the contact identity model, and the
//! storage-key layout every component writes under.

pub mod constants;
pub mod types;

pub use types::{
    ConnectionState, ContactId, ContactIdentity, ConversationId, MessageId, WorkspaceId,
};
