//! Status publishing/subscription abstraction (mechanics only).
//!
//! A status channel is a set of isolated per-tenant rooms. Publishing to a
//! tenant reaches every observer currently subscribed to that tenant and
//! nobody else.
//!
//! ## Delivery
//!
//! - **Latest-state replay**: a new subscriber immediately receives the
//!   tenant's last-known status, so it is never left without state
//! - **No history**: older events are not replayed
//! - **Best effort**: observers that went away are dropped on the next publish
//!   or when their subscription is dropped
//! - **No persistence**: statuses are re-derivable from the live sessions
//!
//! Dropping a subscription has no effect on the tenant's messaging session.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

use remindd_core::TenantId;

use crate::StatusEvent;

/// Errors surfaced by a status channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Internal lock was poisoned by a panicking publisher.
    #[error("status channel lock poisoned")]
    Poisoned,
}

/// A subscription to one tenant's status stream.
///
/// The channel may attach a cleanup hook; it runs once, after the receiver
/// is closed, when the subscription is dropped.
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<M> std::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cleanup", &self.on_drop.is_some())
            .finish_non_exhaustive()
    }
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self {
            receiver,
            on_drop: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_drop = Some(Box::new(cleanup));
        self
    }

    /// Wait for the next message; `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            self.receiver.close();
            cleanup();
        }
    }
}

/// Per-tenant publish/subscribe channel for session status.
///
/// Implementations must be safe to share across tasks; publishers are the
/// session lifecycle tasks, subscribers are per-connection observer tasks.
pub trait StatusChannel: Send + Sync {
    /// Deliver `event` to every current observer of `event.tenant_id`.
    fn publish(&self, event: StatusEvent) -> Result<(), ChannelError>;

    /// Join the tenant's room; the latest status is queued immediately.
    fn subscribe(&self, tenant_id: &TenantId) -> Subscription<StatusEvent>;
}

impl<C> StatusChannel for Arc<C>
where
    C: StatusChannel + ?Sized,
{
    fn publish(&self, event: StatusEvent) -> Result<(), ChannelError> {
        (**self).publish(event)
    }

    fn subscribe(&self, tenant_id: &TenantId) -> Subscription<StatusEvent> {
        (**self).subscribe(tenant_id)
    }
}
