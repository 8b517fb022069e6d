// Transport seam and connection-state machine for the Palaver widget.

pub mod local;
pub mod messages;
pub mod monitor;
pub mod transport;

pub use local::LocalTransport;
pub use messages::OutboundMessage;
pub use monitor::{normalize, ConnectionMonitor};
pub use transport::{RawConnectionState, Transport, TransportError};
