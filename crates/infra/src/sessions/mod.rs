//! Per-tenant messaging sessions.
//!
//! - `transport`: the narrow interface the messaging library is wrapped behind
//! - `registry`: tenant → session lookup (non-owning handles)
//! - `manager`: lifecycle controller, one task per live session
//! - `simulated`: development transport

pub mod manager;
pub mod registry;
pub mod simulated;
pub mod transport;

pub use manager::SessionManager;
pub use registry::{SessionInfo, SessionRegistry, TenantSession};
pub use simulated::SimulatedTransport;
pub use transport::{
    CredentialNamespace, MessagingClient, MessagingTransport, TransportError, TransportEvent,
};
