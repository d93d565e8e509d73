//! Session status events and their per-tenant real-time fan-out.

pub mod bus;
pub mod fanout;
pub mod status;
pub mod tenant;

pub use bus::{ChannelError, StatusChannel, Subscription};
pub use fanout::StatusFanout;
pub use status::{SessionStatus, StatusEvent};
pub use tenant::TenantScoped;
