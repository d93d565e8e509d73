//! `remindd-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! tenant and reminder identifiers, destination normalization, and the rules
//! that turn an appointment plus a reminder basis into a dispatch instant.

pub mod error;
pub mod id;
pub mod schedule;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{ReminderId, TenantId};
pub use schedule::{DispatchBasis, appointment_start, dispatch_at};
pub use value_object::{Destination, ValueObject};
