//! Per-tenant session lifecycle controller.
//!
//! `connect` registers a session and spawns one controller task per tenant.
//! The task owns the client, turns transport events into registry updates
//! and status events, and tears the session down when it ends:
//!
//! ```text
//! initializing ──challenge──▶ awaiting_pairing ──ready──▶ ready
//!      └───────────────────────ready───────────────────────▶┘
//! any ──disconnect / init error / stop──▶ removed (+ `disconnected` event)
//! ```

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use remindd_core::{Destination, TenantId};
use remindd_events::{SessionStatus, StatusChannel, StatusEvent, Subscription};

use super::registry::{SessionInfo, SessionRegistry, TenantSession};
use super::transport::{CredentialNamespace, MessagingClient, MessagingTransport, TransportEvent};
use crate::jobs::{DispatchOutcome, Dispatcher};

const CLOSED_BY_REQUEST: &str = "session closed by request";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Inner {
    registry: SessionRegistry,
    channel: Arc<dyn StatusChannel>,
    transport: Arc<dyn MessagingTransport>,
    credentials_root: PathBuf,
    /// Serializes check-then-create so a tenant never gets two clients built.
    connecting: Mutex<()>,
    tasks: Mutex<JoinSet<()>>,
}

impl Inner {
    fn publish(&self, event: StatusEvent) {
        if let Err(e) = self.channel.publish(event) {
            warn!(error = %e, "failed to publish session status");
        }
    }
}

/// Owns every tenant's messaging session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.inner.registry.len())
            .field("credentials_root", &self.inner.credentials_root)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        channel: Arc<dyn StatusChannel>,
        credentials_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: SessionRegistry::new(),
                channel,
                transport,
                credentials_root: credentials_root.into(),
                connecting: Mutex::new(()),
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Start a session for the tenant, or return the one already registered.
    ///
    /// Initialization continues in the background; failures surface only as
    /// a `disconnected` status event.
    pub fn connect(&self, tenant_id: &TenantId) -> SessionInfo {
        let _connecting = self.inner.connecting.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.inner.registry.get(tenant_id) {
            debug!(tenant_id = %tenant_id, status = %existing.status, "session already registered");
            return existing.info();
        }

        let credentials = CredentialNamespace::for_tenant(&self.inner.credentials_root, tenant_id);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = match self.inner.transport.create_client(tenant_id, credentials, events_tx) {
            Ok(client) => client,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "failed to create messaging client");
                self.inner
                    .publish(StatusEvent::disconnected(tenant_id.clone(), e.to_string()));
                return SessionInfo::disconnected();
            }
        };

        let generation = self.inner.registry.next_generation();
        let stop = Arc::new(Notify::new());
        let session = TenantSession::new(
            tenant_id.clone(),
            generation,
            Arc::downgrade(&client),
            stop.clone(),
        );
        let info = session.info();

        let inserted = self.inner.registry.insert_if_absent(session, |s| {
            self.inner.publish(StatusEvent::initializing(s.tenant_id.clone()));
        });
        if let Err(existing) = inserted {
            // Only reachable if an entry appeared outside `connect`.
            return existing.info();
        }

        info!(tenant_id = %tenant_id, generation, "session created");
        let controller = Controller {
            inner: self.inner.clone(),
            tenant_id: tenant_id.clone(),
            generation,
        };
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "session controller ended abnormally");
            }
        }
        tasks.spawn(controller.run(client, events_rx, stop));
        info
    }

    /// Tear down the tenant's session. Returns `false` if none was registered.
    pub fn disconnect(&self, tenant_id: &TenantId) -> bool {
        let removed = self.inner.registry.remove_with(tenant_id, |s| {
            self.inner
                .publish(StatusEvent::disconnected(s.tenant_id.clone(), CLOSED_BY_REQUEST));
        });
        match removed {
            Some(session) => {
                info!(tenant_id = %tenant_id, generation = session.generation, "session disconnect requested");
                session.stop.notify_one();
                true
            }
            None => false,
        }
    }

    /// Current snapshot; `disconnected` when no session is registered.
    pub fn status(&self, tenant_id: &TenantId) -> SessionInfo {
        self.inner
            .registry
            .get(tenant_id)
            .map(|s| s.info())
            .unwrap_or_else(SessionInfo::disconnected)
    }

    /// Observe a tenant's status stream (latest state replayed first).
    pub fn subscribe(&self, tenant_id: &TenantId) -> Subscription<StatusEvent> {
        self.inner.channel.subscribe(tenant_id)
    }

    /// Tear down every session and wait (bounded) for the controllers to exit.
    pub async fn shutdown_all(&self) {
        let drained = self.inner.registry.drain_with(|s| {
            self.inner
                .publish(StatusEvent::disconnected(s.tenant_id.clone(), "server shutting down"));
        });
        for session in &drained {
            session.stop.notify_one();
        }

        let mut tasks = {
            let mut guard = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        let joined = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if joined.is_err() {
            warn!("session controllers did not stop in time; aborting");
            tasks.abort_all();
        }
        info!(sessions = drained.len(), "all sessions shut down");
    }
}

#[async_trait]
impl Dispatcher for SessionManager {
    async fn dispatch(
        &self,
        tenant_id: &TenantId,
        destination: &Destination,
        body: &str,
    ) -> DispatchOutcome {
        let Some(session) = self.inner.registry.get(tenant_id) else {
            return DispatchOutcome::NotReady;
        };
        if !session.is_ready() {
            return DispatchOutcome::NotReady;
        }
        let Some(client) = session.handle.upgrade() else {
            return DispatchOutcome::NotReady;
        };
        match client.send_message(destination, body).await {
            Ok(()) => DispatchOutcome::Sent,
            Err(e) => DispatchOutcome::Failed(e.to_string()),
        }
    }
}

/// Lifecycle task state for one session instance.
struct Controller {
    inner: Arc<Inner>,
    tenant_id: TenantId,
    generation: u64,
}

impl Controller {
    async fn run(
        self,
        client: Arc<dyn MessagingClient>,
        mut events: UnboundedReceiver<TransportEvent>,
        stop: Arc<Notify>,
    ) {
        let reason = {
            // A panicking client must still release the registry entry below.
            let connect = AssertUnwindSafe(client.connect()).catch_unwind();
            tokio::pin!(connect);
            let mut connecting = true;

            loop {
                tokio::select! {
                    _ = stop.notified() => break CLOSED_BY_REQUEST.to_string(),
                    result = &mut connect, if connecting => {
                        connecting = false;
                        match result {
                            Ok(Ok(())) => debug!(tenant_id = %self.tenant_id, "session initialized"),
                            Ok(Err(e)) => {
                                warn!(tenant_id = %self.tenant_id, error = %e, "session initialization failed");
                                break e.to_string();
                            }
                            Err(_) => {
                                error!(tenant_id = %self.tenant_id, "messaging client panicked during initialization");
                                break "session initialization panicked".to_string();
                            }
                        }
                    }
                    event = events.recv() => match event {
                        Some(TransportEvent::PairingChallenge(challenge)) => {
                            self.transition(SessionStatus::AwaitingPairing, Some(challenge));
                        }
                        Some(TransportEvent::Ready) => self.transition(SessionStatus::Ready, None),
                        Some(TransportEvent::Disconnected(reason)) => {
                            info!(tenant_id = %self.tenant_id, reason = %reason, "transport disconnected");
                            break reason;
                        }
                        None => break "transport event stream closed".to_string(),
                    },
                }
            }
        };

        self.inner
            .registry
            .remove_if(&self.tenant_id, self.generation, |s| {
                self.inner
                    .publish(StatusEvent::disconnected(s.tenant_id.clone(), reason.clone()));
            });
        client.shutdown().await;
        info!(tenant_id = %self.tenant_id, generation = self.generation, reason = %reason, "session released");
    }

    fn transition(&self, status: SessionStatus, challenge: Option<String>) {
        let applied = self.inner.registry.update(&self.tenant_id, self.generation, |s| {
            s.status = status;
            s.pairing_challenge = challenge.clone();
            let event = match (status, challenge) {
                (SessionStatus::AwaitingPairing, Some(challenge)) => {
                    StatusEvent::awaiting_pairing(s.tenant_id.clone(), challenge)
                }
                (SessionStatus::Ready, _) => StatusEvent::ready(s.tenant_id.clone()),
                _ => StatusEvent::initializing(s.tenant_id.clone()),
            };
            self.inner.publish(event);
        });
        if applied {
            info!(tenant_id = %self.tenant_id, status = %status, "session status changed");
        } else {
            debug!(tenant_id = %self.tenant_id, status = %status, "stale session event ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use remindd_events::StatusFanout;
    use tokio::sync::mpsc::UnboundedSender;

    use super::*;
    use crate::sessions::transport::TransportError;

    #[derive(Clone)]
    enum Step {
        Emit(TransportEvent),
        Wait(Arc<Notify>),
        Fail(String),
        Panic,
    }

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        shutdowns: AtomicUsize,
        sent: Mutex<Vec<(String, String)>>,
    }

    struct ScriptedTransport {
        script: Vec<Step>,
        reject_sends: bool,
        build_delay: Duration,
        counters: Arc<Counters>,
    }

    struct ScriptedClient {
        script: Vec<Step>,
        reject_sends: bool,
        events: UnboundedSender<TransportEvent>,
        counters: Arc<Counters>,
    }

    impl MessagingTransport for ScriptedTransport {
        fn create_client(
            &self,
            _tenant_id: &TenantId,
            _credentials: CredentialNamespace,
            events: UnboundedSender<TransportEvent>,
        ) -> Result<Arc<dyn MessagingClient>, TransportError> {
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.build_delay);
            Ok(Arc::new(ScriptedClient {
                script: self.script.clone(),
                reject_sends: self.reject_sends,
                events,
                counters: self.counters.clone(),
            }))
        }
    }

    #[async_trait]
    impl MessagingClient for ScriptedClient {
        async fn connect(&self) -> Result<(), TransportError> {
            for step in &self.script {
                match step {
                    Step::Emit(event) => {
                        let _ = self.events.send(event.clone());
                    }
                    Step::Wait(gate) => gate.notified().await,
                    Step::Fail(msg) => return Err(TransportError::Initialization(msg.clone())),
                    Step::Panic => panic!("client library crashed"),
                }
            }
            Ok(())
        }

        async fn send_message(&self, destination: &Destination, body: &str) -> Result<(), TransportError> {
            if self.reject_sends {
                return Err(TransportError::Send("number not on network".into()));
            }
            self.counters
                .sent
                .lock()
                .unwrap()
                .push((destination.to_string(), body.to_string()));
            Ok(())
        }

        async fn shutdown(&self) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    fn manager(script: Vec<Step>) -> (SessionManager, Arc<Counters>) {
        manager_with(script, false)
    }

    fn manager_with(script: Vec<Step>, reject_sends: bool) -> (SessionManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let transport = ScriptedTransport {
            script,
            reject_sends,
            build_delay: Duration::ZERO,
            counters: counters.clone(),
        };
        let manager = SessionManager::new(
            Arc::new(transport),
            Arc::new(StatusFanout::new()),
            std::env::temp_dir().join("remindd-test-sessions"),
        );
        (manager, counters)
    }

    async fn next(sub: &mut Subscription<StatusEvent>) -> StatusEvent {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed")
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn pairing_flow_reports_every_transition() {
        let gate = Arc::new(Notify::new());
        let (manager, _) = manager(vec![
            Step::Emit(TransportEvent::PairingChallenge("2@qr-payload".into())),
            Step::Wait(gate.clone()),
            Step::Emit(TransportEvent::Ready),
        ]);
        let u1 = tenant("u1");
        let mut sub = manager.subscribe(&u1);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Disconnected);

        manager.connect(&u1);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Initializing);

        let pairing = next(&mut sub).await;
        assert_eq!(pairing.status, SessionStatus::AwaitingPairing);
        assert_eq!(pairing.pairing_challenge.as_deref(), Some("2@qr-payload"));
        let snapshot = manager.status(&u1);
        assert_eq!(snapshot.status, SessionStatus::AwaitingPairing);
        assert_eq!(snapshot.pairing_challenge.as_deref(), Some("2@qr-payload"));

        gate.notify_one();
        assert_eq!(next(&mut sub).await.status, SessionStatus::Ready);
        let snapshot = manager.status(&u1);
        assert_eq!(snapshot.status, SessionStatus::Ready);
        assert!(snapshot.pairing_challenge.is_none());
    }

    #[tokio::test]
    async fn reused_credentials_go_straight_to_ready() {
        let (manager, _) = manager(vec![Step::Emit(TransportEvent::Ready)]);
        let u2 = tenant("u2");
        let mut sub = manager.subscribe(&u2);
        next(&mut sub).await;

        manager.connect(&u2);
        let mut before_ready = 0;
        loop {
            let event = next(&mut sub).await;
            match event.status {
                SessionStatus::Initializing | SessionStatus::AwaitingPairing => before_ready += 1,
                SessionStatus::Ready => break,
                SessionStatus::Disconnected => panic!("unexpected disconnect"),
            }
        }
        assert_eq!(before_ready, 1);
        assert_eq!(manager.registry().tenants(), vec![u2]);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (manager, counters) = manager(vec![Step::Emit(TransportEvent::Ready)]);
        let u1 = tenant("u1");
        manager.connect(&u1);
        let first = manager.registry().get(&u1).unwrap().generation;
        manager.connect(&u1);
        manager.connect(&u1);

        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registry().get(&u1).unwrap().generation, first);
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_build_a_single_client() {
        let counters = Arc::new(Counters::default());
        let manager = SessionManager::new(
            Arc::new(ScriptedTransport {
                script: vec![Step::Emit(TransportEvent::Ready)],
                reject_sends: false,
                build_delay: Duration::from_millis(20),
                counters: counters.clone(),
            }),
            Arc::new(StatusFanout::new()),
            std::env::temp_dir().join("remindd-test-sessions"),
        );

        let mut racers = JoinSet::new();
        for _ in 0..8 {
            let manager = manager.clone();
            racers.spawn(async move { manager.connect(&tenant("u1")) });
        }
        while let Some(joined) = racers.join_next().await {
            joined.unwrap();
        }

        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test]
    async fn initialization_error_removes_session_and_reports_it() {
        let (manager, counters) = manager(vec![Step::Fail("browser failed to launch".into())]);
        let u1 = tenant("u1");
        let mut sub = manager.subscribe(&u1);
        next(&mut sub).await;

        manager.connect(&u1);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Initializing);
        let event = next(&mut sub).await;
        assert_eq!(event.status, SessionStatus::Disconnected);
        assert!(event.message.unwrap().contains("browser failed to launch"));

        assert!(manager.registry().get(&u1).is_none());
        wait_until(|| counters.shutdowns.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn panicking_client_is_released_and_tenant_can_reconnect() {
        let (manager, counters) = manager(vec![
            Step::Emit(TransportEvent::PairingChallenge("qr".into())),
            Step::Panic,
        ]);
        let u1 = tenant("u1");
        let mut sub = manager.subscribe(&u1);
        next(&mut sub).await;

        manager.connect(&u1);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Initializing);
        let mut last = next(&mut sub).await;
        if last.status == SessionStatus::AwaitingPairing {
            last = next(&mut sub).await;
        }
        assert_eq!(last.status, SessionStatus::Disconnected);
        assert_eq!(last.message.as_deref(), Some("session initialization panicked"));
        assert!(manager.registry().get(&u1).is_none());
        wait_until(|| counters.shutdowns.load(Ordering::SeqCst) == 1).await;

        manager.connect(&u1);
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Initializing);
    }

    #[tokio::test]
    async fn transport_disconnect_is_terminal() {
        let (manager, counters) = manager(vec![
            Step::Emit(TransportEvent::Ready),
            Step::Emit(TransportEvent::Disconnected("logged out from phone".into())),
        ]);
        let u1 = tenant("u1");
        let mut sub = manager.subscribe(&u1);
        next(&mut sub).await;

        manager.connect(&u1);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Initializing);
        assert_eq!(next(&mut sub).await.status, SessionStatus::Ready);
        let event = next(&mut sub).await;
        assert_eq!(event.status, SessionStatus::Disconnected);
        assert_eq!(event.message.as_deref(), Some("logged out from phone"));

        assert_eq!(manager.status(&u1), SessionInfo::disconnected());
        wait_until(|| counters.shutdowns.load(Ordering::SeqCst) == 1).await;

        // A fresh connect builds a new client.
        manager.connect(&u1);
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn explicit_disconnect_releases_handle() {
        let (manager, counters) = manager(vec![Step::Emit(TransportEvent::Ready)]);
        let u1 = tenant("u1");
        let mut sub = manager.subscribe(&u1);
        next(&mut sub).await;
        manager.connect(&u1);
        next(&mut sub).await;
        assert_eq!(next(&mut sub).await.status, SessionStatus::Ready);
        let handle = manager.registry().get(&u1).unwrap().handle;

        assert!(manager.disconnect(&u1));
        let event = next(&mut sub).await;
        assert_eq!(event.status, SessionStatus::Disconnected);
        assert!(manager.registry().is_empty());

        wait_until(|| handle.upgrade().is_none()).await;
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!manager.disconnect(&u1));
        assert!(sub.try_recv().is_err(), "teardown must publish exactly one disconnect");
    }

    #[tokio::test]
    async fn late_observer_gets_ready_replay() {
        let (manager, _) = manager(vec![Step::Emit(TransportEvent::Ready)]);
        let u1 = tenant("u1");
        manager.connect(&u1);
        wait_until(|| manager.status(&u1).status == SessionStatus::Ready).await;

        let mut late = manager.subscribe(&u1);
        assert_eq!(late.try_recv().unwrap().status, SessionStatus::Ready);
    }

    #[tokio::test]
    async fn dispatch_requires_ready_session() {
        let gate = Arc::new(Notify::new());
        let (manager, counters) = manager(vec![
            Step::Emit(TransportEvent::PairingChallenge("qr".into())),
            Step::Wait(gate.clone()),
            Step::Emit(TransportEvent::Ready),
        ]);
        let u1 = tenant("u1");
        let dest = Destination::normalize("5599999999", None).unwrap();

        assert_eq!(manager.dispatch(&u1, &dest, "hi").await, DispatchOutcome::NotReady);
        manager.connect(&u1);
        wait_until(|| manager.status(&u1).status == SessionStatus::AwaitingPairing).await;
        assert_eq!(manager.dispatch(&u1, &dest, "hi").await, DispatchOutcome::NotReady);

        gate.notify_one();
        wait_until(|| manager.status(&u1).status == SessionStatus::Ready).await;
        assert_eq!(manager.dispatch(&u1, &dest, "hi").await, DispatchOutcome::Sent);
        assert_eq!(
            *counters.sent.lock().unwrap(),
            vec![("5599999999".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn send_error_is_a_failed_dispatch_and_keeps_session() {
        let (manager, _) = manager_with(vec![Step::Emit(TransportEvent::Ready)], true);
        let u1 = tenant("u1");
        manager.connect(&u1);
        wait_until(|| manager.status(&u1).status == SessionStatus::Ready).await;

        let dest = Destination::normalize("5599999999", None).unwrap();
        let outcome = manager.dispatch(&u1, &dest, "hi").await;
        assert!(matches!(outcome, DispatchOutcome::Failed(ref e) if e.contains("not on network")));
        assert_eq!(manager.status(&u1).status, SessionStatus::Ready);
    }

    #[tokio::test]
    async fn shutdown_all_tears_down_every_tenant() {
        let (manager, counters) = manager(vec![Step::Emit(TransportEvent::Ready)]);
        for t in ["a", "b", "c"] {
            manager.connect(&tenant(t));
        }
        manager.shutdown_all().await;
        assert!(manager.registry().is_empty());
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 3);
    }
}
