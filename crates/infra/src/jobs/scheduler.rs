//! Reminder dispatch loop: poll for due jobs, send through the owning
//! tenant's session, record outcomes.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use remindd_core::{Destination, TenantId};

use super::queue::ReminderQueue;
use super::store::JobStoreError;
use super::types::{ReminderJob, Transition, TransitionOutcome};

/// Outcome of handing one reminder to a tenant's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed(String),
    /// No registered session, or it is not ready; retry next tick.
    NotReady,
}

/// Narrow send interface the loop needs from the session layer.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        tenant_id: &TenantId,
        destination: &Destination,
        body: &str,
    ) -> DispatchOutcome;
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll for due jobs
    pub poll_interval: Duration,
    /// Upper bound for one dispatch call; hitting it is a failure
    pub dispatch_timeout: Duration,
    /// Fail due jobs that waited longer than this for a ready session
    pub max_pending_age: Option<Duration>,
    /// Name for logging
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
            max_pending_age: None,
            name: "reminder-scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_max_pending_age(mut self, age: Option<Duration>) -> Self {
        self.max_pending_age = age;
        self
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TickReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub deferred: usize,
    pub expired: usize,
    /// Records actually changed in the store.
    pub persisted: usize,
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub ticks_failed: u64,
    pub jobs_sent: u64,
    pub jobs_failed: u64,
    pub jobs_expired: u64,
    pub jobs_deferred: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

impl SchedulerStats {
    fn record(&mut self, report: &TickReport, at: DateTime<Utc>) {
        self.ticks += 1;
        self.jobs_sent += report.sent as u64;
        self.jobs_failed += report.failed as u64;
        self.jobs_expired += report.expired as u64;
        self.jobs_deferred += report.deferred as u64;
        self.last_tick_at = Some(at);
    }
}

/// Handle to control a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Arc<Notify>,
    join: Option<tokio::task::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl SchedulerHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Shared view of the statistics (for status endpoints).
    pub fn stats_ref(&self) -> Arc<Mutex<SchedulerStats>> {
        self.stats.clone()
    }

    /// Get current scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Background reminder scheduler.
pub struct ReminderScheduler {
    queue: Arc<ReminderQueue>,
    dispatcher: Arc<dyn Dispatcher>,
    config: SchedulerConfig,
}

impl ReminderScheduler {
    pub fn new(
        queue: Arc<ReminderQueue>,
        dispatcher: Arc<dyn Dispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            config,
        }
    }

    /// Process every job due at `now` once.
    ///
    /// Dispatch happens outside the queue lock; outcomes are then applied to
    /// a fresh load in a single write.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, JobStoreError> {
        let due = self.queue.due(now).await;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let mut transitions = Vec::new();
        for job in due {
            let outcome = self.dispatch_one(&job).await;

            let outcome = match outcome {
                DispatchOutcome::Sent => {
                    report.sent += 1;
                    info!(reminder_id = %job.id, tenant_id = %job.tenant_id, "reminder sent");
                    TransitionOutcome::Sent
                }
                DispatchOutcome::Failed(error) => {
                    report.failed += 1;
                    warn!(reminder_id = %job.id, tenant_id = %job.tenant_id, error = %error, "reminder dispatch failed");
                    TransitionOutcome::Failed(error)
                }
                DispatchOutcome::NotReady if self.is_expired(job.dispatch_at, now) => {
                    report.expired += 1;
                    warn!(reminder_id = %job.id, tenant_id = %job.tenant_id, "reminder expired waiting for a ready session");
                    TransitionOutcome::Failed("expired".to_string())
                }
                DispatchOutcome::NotReady => {
                    report.deferred += 1;
                    debug!(reminder_id = %job.id, tenant_id = %job.tenant_id, "session not ready; reminder deferred");
                    continue;
                }
            };

            transitions.push(Transition {
                id: job.id,
                observed_dispatch_at: job.dispatch_at,
                outcome,
            });
        }

        report.persisted = self.queue.apply(transitions).await?;
        Ok(report)
    }

    /// Send one job in its own task, bounded by the dispatch timeout.
    ///
    /// A panic inside the session layer fails only this job; the rest of the
    /// tick and the outcomes already gathered are unaffected.
    async fn dispatch_one(&self, job: &ReminderJob) -> DispatchOutcome {
        let dispatcher = self.dispatcher.clone();
        let tenant_id = job.tenant_id.clone();
        let destination = job.destination.clone();
        let body = job.body.clone();
        let mut task = tokio::spawn(async move {
            dispatcher.dispatch(&tenant_id, &destination, &body).await
        });

        match tokio::time::timeout(self.config.dispatch_timeout, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(reminder_id = %job.id, tenant_id = %job.tenant_id, error = %e, "dispatch task panicked");
                DispatchOutcome::Failed("dispatch panicked".to_string())
            }
            Err(_) => {
                task.abort();
                DispatchOutcome::Failed(format!(
                    "dispatch timed out after {:?}",
                    self.config.dispatch_timeout
                ))
            }
        }
    }

    fn is_expired(&self, dispatch_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(max_age) = self.config.max_pending_age else {
            return false;
        };
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        now - dispatch_at > max_age
    }

    /// Spawn the loop on the tokio runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));

        let join = tokio::spawn(scheduler_loop(Arc::new(self), shutdown.clone(), stats.clone()));

        SchedulerHandle {
            shutdown,
            join: Some(join),
            stats,
        }
    }
}

async fn scheduler_loop(
    scheduler: Arc<ReminderScheduler>,
    shutdown: Arc<Notify>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    let name = scheduler.config.name.clone();
    info!(scheduler = %name, interval = ?scheduler.config.poll_interval, "reminder scheduler started");
    let start_time = Instant::now();

    let mut interval = tokio::time::interval(scheduler.config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = interval.tick() => {}
        }

        // Each tick runs as its own task so a panic is contained to that tick.
        let s = scheduler.clone();
        let now = Utc::now();
        let result = tokio::spawn(async move { s.tick(now).await }).await;

        let Ok(mut st) = stats.lock() else {
            error!(scheduler = %name, "scheduler stats lock poisoned");
            continue;
        };
        st.uptime_secs = start_time.elapsed().as_secs();
        match result {
            Ok(Ok(report)) => {
                if report.due > 0 {
                    info!(
                        scheduler = %name,
                        due = report.due,
                        sent = report.sent,
                        failed = report.failed,
                        deferred = report.deferred,
                        expired = report.expired,
                        "tick complete"
                    );
                }
                st.record(&report, now);
            }
            Ok(Err(e)) => {
                st.ticks_failed += 1;
                error!(scheduler = %name, error = %e, "tick failed; outcomes will be retried");
            }
            Err(e) => {
                st.ticks_failed += 1;
                error!(scheduler = %name, error = %e, "tick task aborted");
            }
        }
    }

    info!(scheduler = %name, "reminder scheduler stopped");
}
