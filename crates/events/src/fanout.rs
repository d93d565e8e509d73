//! In-memory per-tenant fan-out with last-known replay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

use remindd_core::TenantId;

use crate::bus::{ChannelError, StatusChannel, Subscription};
use crate::status::SessionStatus;
use crate::tenant::TenantScoped;
use crate::StatusEvent;

type Rooms = Mutex<HashMap<TenantId, Room>>;

#[derive(Debug, Default)]
struct Room {
    subscribers: Vec<mpsc::UnboundedSender<StatusEvent>>,
    last: Option<StatusEvent>,
}

impl Room {
    /// Nobody is listening and there is no live state worth replaying; a
    /// later subscriber gets the synthetic `disconnected` instead.
    fn is_idle(&self) -> bool {
        self.subscribers.is_empty()
            && self
                .last
                .as_ref()
                .is_none_or(|event| event.status == SessionStatus::Disconnected)
    }
}

/// Remove the tenant's room once it is idle.
fn release(rooms: &mut HashMap<TenantId, Room>, tenant_id: &TenantId) {
    if let Some(room) = rooms.get_mut(tenant_id) {
        room.subscribers.retain(|tx| !tx.is_closed());
        if room.is_idle() {
            rooms.remove(tenant_id);
        }
    }
}

/// In-memory status fan-out.
///
/// - One room per tenant, created lazily and dropped again once idle, so
///   the map is bounded by live sessions plus live observers
/// - Replay and registration happen under the same lock, so a subscriber
///   sees the latest status exactly once and then every later event
/// - Unbounded per-observer queues; a slow observer never blocks publishers
#[derive(Debug, Default)]
pub struct StatusFanout {
    rooms: Arc<Rooms>,
}

impl StatusFanout {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusChannel for StatusFanout {
    fn publish(&self, event: StatusEvent) -> Result<(), ChannelError> {
        let mut rooms = self.rooms.lock().map_err(|_| ChannelError::Poisoned)?;
        let tenant_id = event.tenant_id().clone();
        let room = rooms.entry(tenant_id.clone()).or_default();

        // Drop any dead observers while publishing.
        room.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::debug!(
            tenant_id = %event.tenant_id,
            status = %event.status,
            observers = room.subscribers.len(),
            "status published"
        );
        room.last = Some(event);
        release(&mut rooms, &tenant_id);

        Ok(())
    }

    fn subscribe(&self, tenant_id: &TenantId) -> Subscription<StatusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        // If the lock is poisoned we still return a subscription; it just
        // receives the synthetic replay and nothing else.
        match self.rooms.lock() {
            Ok(mut rooms) => {
                let room = rooms.entry(tenant_id.clone()).or_default();
                let replay = room
                    .last
                    .clone()
                    .unwrap_or_else(|| StatusEvent::not_connected(tenant_id.clone()));
                if tx.send(replay).is_ok() {
                    room.subscribers.push(tx);
                }
            }
            Err(_) => {
                let _ = tx.send(StatusEvent::not_connected(tenant_id.clone()));
                return Subscription::new(rx);
            }
        }

        let rooms: Weak<Rooms> = Arc::downgrade(&self.rooms);
        let tenant_id = tenant_id.clone();
        Subscription::new(rx).with_cleanup(move || {
            if let Some(rooms) = rooms.upgrade() {
                let mut rooms = rooms.lock().unwrap_or_else(PoisonError::into_inner);
                release(&mut rooms, &tenant_id);
            }
        })
    }
}
