//! Service wiring: one explicitly constructed object owning the queue, the
//! session manager and the dispatch loop stats, handed to every handler.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use remindd_events::StatusFanout;
use remindd_infra::AppConfig;
use remindd_infra::jobs::{
    JobStore, ReminderQueue, ReminderScheduler, SchedulerConfig, SchedulerHandle, SchedulerStats,
};
use remindd_infra::sessions::{MessagingTransport, SessionManager};

use crate::app::dto::IngressPolicy;

/// Shared state behind every route.
pub struct AppServices {
    pub config: AppConfig,
    pub policy: IngressPolicy,
    pub queue: Arc<ReminderQueue>,
    pub sessions: SessionManager,
    scheduler_stats: Arc<Mutex<SchedulerStats>>,
    closing: watch::Sender<bool>,
}

impl AppServices {
    /// Resolves once the server starts shutting down; long-lived streams end on it.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }

    /// Signal every open status stream to finish.
    pub fn close_streams(&self) {
        self.closing.send_replace(true);
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Running services plus the background dispatch loop.
pub struct Runtime {
    pub services: Arc<AppServices>,
    scheduler: SchedulerHandle,
}

impl Runtime {
    /// Wire everything together and start the dispatch loop.
    pub fn start(
        config: AppConfig,
        store: Arc<dyn JobStore>,
        transport: Arc<dyn MessagingTransport>,
    ) -> Self {
        let queue = Arc::new(ReminderQueue::new(store));
        let fanout = Arc::new(StatusFanout::new());
        let sessions = SessionManager::new(transport, fanout, config.sessions_dir.clone());

        let scheduler = ReminderScheduler::new(
            queue.clone(),
            Arc::new(sessions.clone()),
            SchedulerConfig::default()
                .with_poll_interval(config.scheduler_interval)
                .with_dispatch_timeout(config.dispatch_timeout)
                .with_max_pending_age(config.max_pending_age),
        )
        .spawn();

        let services = Arc::new(AppServices {
            policy: IngressPolicy::from(&config),
            config,
            queue,
            sessions,
            scheduler_stats: scheduler.stats_ref(),
            closing: watch::channel(false).0,
        });

        Self {
            services,
            scheduler,
        }
    }

    /// Stop the dispatch loop first, then release every session.
    pub async fn shutdown(self) {
        self.services.close_streams();
        self.scheduler.shutdown().await;
        self.services.sessions.shutdown_all().await;
    }
}
