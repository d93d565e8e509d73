//! Core reminder job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use remindd_core::{Destination, ReminderId, TenantId};

/// Reminder job state.
///
/// Older collection files written with Portuguese labels are still readable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    /// Waiting for its dispatch time and a ready session.
    #[serde(alias = "agendado")]
    Scheduled,
    /// Delivered to the messaging transport.
    #[serde(alias = "enviado")]
    Sent,
    /// Canceled before dispatch.
    #[serde(alias = "cancelado")]
    Canceled,
    /// Dispatch failed or the job expired; terminal until resubmitted.
    #[serde(alias = "falhou")]
    Failed,
}

/// A time-triggered reminder, persisted as one record of the collection file.
///
/// Field names on disk: `id, userId, number, message, sendAt, status` (+ `error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJob {
    /// Originating appointment id (one active job per appointment).
    pub id: ReminderId,
    /// Owning tenant.
    #[serde(rename = "userId")]
    pub tenant_id: TenantId,
    #[serde(rename = "number")]
    pub destination: Destination,
    /// Fully rendered text.
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "sendAt")]
    pub dispatch_at: DateTime<Utc>,
    #[serde(rename = "status")]
    pub state: ReminderState,
    /// Reason for the last failure, when `state == failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReminderJob {
    /// Create a new scheduled job.
    pub fn new(
        id: ReminderId,
        tenant_id: TenantId,
        destination: Destination,
        body: impl Into<String>,
        dispatch_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            destination,
            body: body.into(),
            dispatch_at,
            state: ReminderState::Scheduled,
            error: None,
        }
    }

    /// Scheduled and past its dispatch time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == ReminderState::Scheduled && self.dispatch_at <= now
    }

    pub fn mark_sent(&mut self) {
        self.state = ReminderState::Sent;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = ReminderState::Failed;
        self.error = Some(error.into());
    }

    pub fn mark_canceled(&mut self) {
        self.state = ReminderState::Canceled;
    }
}

/// State change computed by a dispatch tick, applied in a second pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: ReminderId,
    /// `sendAt` the tick observed; a record rescheduled since is left alone.
    pub observed_dispatch_at: DateTime<Utc>,
    pub outcome: TransitionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Sent,
    Failed(String),
}
