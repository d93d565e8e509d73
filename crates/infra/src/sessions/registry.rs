//! In-memory tenant → session map.
//!
//! Entries are stamped with a generation so a lifecycle task can only touch
//! the entry it created, never a newer session for the same tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::Serialize;
use tokio::sync::Notify;

use remindd_core::TenantId;
use remindd_events::SessionStatus;

use super::transport::MessagingClient;

/// Registry view of one tenant's session.
///
/// `handle` is a lookup reference; the lifecycle task holds the only strong one.
#[derive(Debug, Clone)]
pub struct TenantSession {
    pub tenant_id: TenantId,
    pub status: SessionStatus,
    /// Present only while `awaiting_pairing`.
    pub pairing_challenge: Option<String>,
    pub generation: u64,
    pub handle: Weak<dyn MessagingClient>,
    pub(crate) stop: Arc<Notify>,
}

impl TenantSession {
    pub fn new(
        tenant_id: TenantId,
        generation: u64,
        handle: Weak<dyn MessagingClient>,
        stop: Arc<Notify>,
    ) -> Self {
        Self {
            tenant_id,
            status: SessionStatus::Initializing,
            pairing_challenge: None,
            generation,
            handle,
            stop,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            status: self.status,
            pairing_challenge: self.pairing_challenge.clone(),
        }
    }
}

/// Public snapshot of a session (`GET /status`, `POST /connect`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_challenge: Option<String>,
}

impl SessionInfo {
    pub fn disconnected() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            pairing_challenge: None,
        }
    }
}

/// Tenant session map.
///
/// The hook closures on the conditional operations run while the write lock
/// is held, which keeps status publication in the same order as the map
/// changes it describes.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<TenantId, TenantSession>>,
    generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<TenantSession> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(tenant_id).cloned()
    }

    #[cfg(test)]
    fn put(&self, session: TenantSession) -> Option<TenantSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.tenant_id.clone(), session)
    }

    /// Remove whatever entry the tenant has, running `on_remove` under the lock.
    pub fn remove_with(
        &self,
        tenant_id: &TenantId,
        on_remove: impl FnOnce(&TenantSession),
    ) -> Option<TenantSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let removed = sessions.remove(tenant_id)?;
        on_remove(&removed);
        Some(removed)
    }

    /// Insert unless the tenant already has a session, in which case that
    /// session is returned as the error.
    pub fn insert_if_absent(
        &self,
        session: TenantSession,
        on_insert: impl FnOnce(&TenantSession),
    ) -> Result<(), TenantSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(&session.tenant_id) {
            return Err(existing.clone());
        }
        on_insert(&session);
        sessions.insert(session.tenant_id.clone(), session);
        Ok(())
    }

    /// Mutate the entry only if it is still the given generation.
    pub fn update(
        &self,
        tenant_id: &TenantId,
        generation: u64,
        f: impl FnOnce(&mut TenantSession),
    ) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(tenant_id) {
            Some(session) if session.generation == generation => {
                f(session);
                true
            }
            _ => false,
        }
    }

    /// Remove the entry only if it is still the given generation.
    pub fn remove_if(
        &self,
        tenant_id: &TenantId,
        generation: u64,
        on_remove: impl FnOnce(&TenantSession),
    ) -> Option<TenantSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(tenant_id)?.generation != generation {
            return None;
        }
        let removed = sessions.remove(tenant_id)?;
        on_remove(&removed);
        Some(removed)
    }

    /// Empty the map, running `on_remove` for each entry under the lock.
    pub fn drain_with(&self, mut on_remove: impl FnMut(&TenantSession)) -> Vec<TenantSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let drained: Vec<_> = sessions.drain().map(|(_, s)| s).collect();
        drained.iter().for_each(&mut on_remove);
        drained
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn tenants(&self) -> Vec<TenantId> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.keys().cloned().collect()
    }
}
