//! Durable reminder jobs and the loop that dispatches them.
//!
//! ## Components
//!
//! - `ReminderJob`: one scheduled message, persisted as a record of the collection
//! - `JobStore`: whole-collection persistence (flat JSON file or in-memory)
//! - `ReminderQueue`: serializes every read-modify-write of the collection
//! - `ReminderScheduler`: polls for due jobs and hands them to a `Dispatcher`

pub mod queue;
pub mod scheduler;
pub mod store;
pub mod types;

pub use queue::{CancelOutcome, ReminderQueue};
pub use scheduler::{
    DispatchOutcome, Dispatcher, ReminderScheduler, SchedulerConfig, SchedulerHandle,
    SchedulerStats, TickReport,
};
pub use store::{FileJobStore, InMemoryJobStore, JobStore, JobStoreError};
pub use types::{ReminderJob, ReminderState, Transition, TransitionOutcome};
