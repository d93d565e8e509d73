//! Lifecycle status of a tenant's messaging session, as pushed to front-ends.

use serde::{Deserialize, Serialize};

use remindd_core::TenantId;

/// Lifecycle state of a tenant messaging session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    AwaitingPairing,
    Ready,
    Disconnected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::AwaitingPairing => "awaiting_pairing",
            SessionStatus::Ready => "ready",
            SessionStatus::Disconnected => "disconnected",
        }
    }
}

impl core::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral status notification (`status_update` on the wire).
///
/// The tenant id routes the event and is not part of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    #[serde(skip)]
    pub tenant_id: TenantId,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEvent {
    fn new(tenant_id: TenantId, status: SessionStatus) -> Self {
        Self {
            tenant_id,
            status,
            pairing_challenge: None,
            message: None,
        }
    }

    pub fn initializing(tenant_id: TenantId) -> Self {
        Self::new(tenant_id, SessionStatus::Initializing)
    }

    pub fn awaiting_pairing(tenant_id: TenantId, challenge: impl Into<String>) -> Self {
        Self {
            pairing_challenge: Some(challenge.into()),
            ..Self::new(tenant_id, SessionStatus::AwaitingPairing)
        }
    }

    pub fn ready(tenant_id: TenantId) -> Self {
        Self::new(tenant_id, SessionStatus::Ready)
    }

    pub fn disconnected(tenant_id: TenantId, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(tenant_id, SessionStatus::Disconnected)
        }
    }

    /// Replay for a tenant that never connected (or whose state was lost on restart).
    pub fn not_connected(tenant_id: TenantId) -> Self {
        Self::disconnected(tenant_id, "not connected; request a connection to start pairing")
    }
}
