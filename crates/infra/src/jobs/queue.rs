//! The durable reminder queue: every read-modify-write of the collection
//! goes through one critical section.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use remindd_core::{ReminderId, TenantId};

use super::store::{JobStore, JobStoreError};
use super::types::{ReminderJob, ReminderState, Transition, TransitionOutcome};

/// Result of a cancellation request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// Unknown id, owned by another tenant, or no longer scheduled.
    NotFound,
}

/// Serialized access to a [`JobStore`].
///
/// Ingress (upsert, cancel) and the dispatch loop share this queue; the
/// async mutex guarantees a cancellation can never be overwritten by a
/// concurrent tick's write, and vice versa. Blocking store I/O runs on the
/// blocking pool.
pub struct ReminderQueue {
    store: Arc<dyn JobStore>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for ReminderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderQueue").finish_non_exhaustive()
    }
}

impl ReminderQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<ReminderJob>, JobStoreError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load_all())
            .await
            .map_err(|e| JobStoreError::Task(e.to_string()))?
    }

    async fn save(&self, jobs: Vec<ReminderJob>) -> Result<(), JobStoreError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save_all(&jobs))
            .await
            .map_err(|e| JobStoreError::Task(e.to_string()))?
    }

    /// Read-only snapshot; read failures degrade to an empty collection.
    async fn snapshot(&self) -> Vec<ReminderJob> {
        let _guard = self.lock.lock().await;
        match self.load().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "failed to load reminders; treating store as empty");
                Vec::new()
            }
        }
    }

    /// Run `f` over the collection under the lock; persist once if it reports a change.
    ///
    /// A load failure aborts the mutation instead of degrading to empty, so
    /// a transient read error can never wipe the stored collection.
    async fn mutate<R, F>(&self, f: F) -> Result<R, JobStoreError>
    where
        F: FnOnce(&mut Vec<ReminderJob>) -> (R, bool),
    {
        let _guard = self.lock.lock().await;
        let mut jobs = self.load().await?;
        let (result, changed) = f(&mut jobs);
        if changed {
            if let Err(e) = self.save(jobs).await {
                tracing::error!(error = %e, "failed to persist reminders");
                return Err(e);
            }
        }
        Ok(result)
    }

    /// Insert or replace jobs keyed by id. Returns how many were written.
    ///
    /// Re-submitting an id replaces the previous record whatever its state,
    /// which puts a failed or canceled reminder back to `scheduled`.
    pub async fn upsert_batch(&self, batch: Vec<ReminderJob>) -> Result<usize, JobStoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.mutate(|jobs| {
            let count = batch.len();
            for job in batch {
                match jobs.iter_mut().find(|j| j.id == job.id) {
                    Some(existing) => {
                        tracing::debug!(reminder_id = %job.id, tenant_id = %job.tenant_id, "reminder replaced");
                        *existing = job;
                    }
                    None => {
                        tracing::debug!(reminder_id = %job.id, tenant_id = %job.tenant_id, "reminder added");
                        jobs.push(job);
                    }
                }
            }
            (count, true)
        })
        .await
    }

    /// Cancel a scheduled job owned by `tenant_id`.
    pub async fn cancel(
        &self,
        tenant_id: &TenantId,
        id: &ReminderId,
    ) -> Result<CancelOutcome, JobStoreError> {
        self.mutate(|jobs| {
            match jobs.iter_mut().find(|j| {
                &j.id == id && &j.tenant_id == tenant_id && j.state == ReminderState::Scheduled
            }) {
                Some(job) => {
                    job.mark_canceled();
                    (CancelOutcome::Canceled, true)
                }
                None => (CancelOutcome::NotFound, false),
            }
        })
        .await
    }

    /// Every job owned by `tenant_id`.
    pub async fn list_for_tenant(&self, tenant_id: &TenantId) -> Vec<ReminderJob> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|j| &j.tenant_id == tenant_id)
            .collect()
    }

    /// Jobs that are scheduled and past their dispatch time.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<ReminderJob> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|j| j.is_due(now))
            .collect()
    }

    /// Apply a tick's outcomes against a fresh load, persisting once.
    ///
    /// A transition only lands on a record that is still scheduled with the
    /// `sendAt` the tick saw: anything canceled or resubmitted meanwhile wins.
    /// Returns how many records changed.
    pub async fn apply(&self, transitions: Vec<Transition>) -> Result<usize, JobStoreError> {
        if transitions.is_empty() {
            return Ok(0);
        }
        self.mutate(|jobs| {
            let mut applied = 0;
            for t in transitions {
                let Some(job) = jobs.iter_mut().find(|j| {
                    j.id == t.id
                        && j.state == ReminderState::Scheduled
                        && j.dispatch_at == t.observed_dispatch_at
                }) else {
                    tracing::info!(reminder_id = %t.id, "reminder changed during dispatch; outcome not recorded");
                    continue;
                };
                match t.outcome {
                    TransitionOutcome::Sent => job.mark_sent(),
                    TransitionOutcome::Failed(error) => job.mark_failed(error),
                }
                applied += 1;
            }
            (applied, applied > 0)
        })
        .await
    }
}
