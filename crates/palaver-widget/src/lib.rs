//! # palaver-widget
//!
//! The embeddable chat widget's resilience layer: everything that keeps a
//! conversation consistent when the network drops, the host application is
//! backgrounded, the process restarts, or a user mashes the send button.
//!
//! The [`Widget`] facade owns the components and exposes the surface the
//! embedding UI consumes; each component is also usable on its own:
//!
//! - [`rate_limit::RateLimiter`] — sliding-window guard on the send path
//! - [`session::SessionManager`] — time-boxed session, activity vs. renewal
//! - [`identity::ContactIdentityResolver`] — durable contact identity
//! - [`sync::SyncCoordinator`] — drains the offline queue on reconnect,
//!   manual retry, or a background-sync wake-up
//!
//! Persistence, transport, and the hosting environment are injected
//! capabilities; nothing in this crate touches host globals.

pub mod config;
pub mod events;
pub mod host;
pub mod identity;
pub mod identity_http;
pub mod rate_limit;
pub mod session;
pub mod sync;
pub mod widget;

pub use config::{RateLimitConfig, SessionConfig, WidgetConfig};
pub use events::WidgetEvent;
pub use host::{HostEnvironment, StaticHost};
pub use identity::{ContactDetails, ContactIdentityResolver, IdentityError, IdentityService};
pub use identity_http::HttpIdentityService;
pub use rate_limit::RateLimiter;
pub use session::{SessionEvent, SessionManager, SessionState};
pub use sync::{SyncCoordinator, SyncEvent, SyncOutcome};
pub use widget::{default_store, Widget};

use tracing_subscriber::{fmt, EnvFilter};

/// Install a tracing subscriber for embeddings that do not bring their own.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("palaver_widget=debug,palaver_transport=debug,palaver_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
