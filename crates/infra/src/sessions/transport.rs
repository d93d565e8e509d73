//! Narrow interface over the underlying messaging library.
//!
//! A client reports lifecycle changes as [`TransportEvent`]s on the channel it
//! was created with; the lifecycle controller is the only consumer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use remindd_core::{Destination, TenantId};

/// Lifecycle notifications raised by a messaging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Opaque pairing payload the user must present to the companion app.
    PairingChallenge(String),
    Ready,
    /// Session ended on the transport side; the string is the reason.
    Disconnected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("initialization failed: {0}")]
    Initialization(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("client closed")]
    Closed,
    #[error("credential storage: {0}")]
    Io(#[from] std::io::Error),
}

/// One tenant's messaging client.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Start the session. Completes when initialization is done or failed;
    /// pairing and readiness are reported as events, not through the result.
    async fn connect(&self) -> Result<(), TransportError>;

    async fn send_message(&self, destination: &Destination, body: &str) -> Result<(), TransportError>;

    /// Release transport resources. Idempotent.
    async fn shutdown(&self);
}

/// Factory for per-tenant clients.
pub trait MessagingTransport: Send + Sync {
    fn create_client(
        &self,
        tenant_id: &TenantId,
        credentials: CredentialNamespace,
        events: UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn MessagingClient>, TransportError>;
}

/// Tenant-scoped credential storage area (`<root>/<tenant id>`).
///
/// Tenant ids cannot contain separators or be `.`/`..`, so the directory
/// always sits directly under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialNamespace {
    dir: PathBuf,
}

impl CredentialNamespace {
    pub fn for_tenant(root: &Path, tenant_id: &TenantId) -> Self {
        Self {
            dir: root.join(tenant_id.as_str()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a file inside the namespace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create the directory if needed.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_disjoint_per_tenant() {
        let root = Path::new("/srv/sessions");
        let a = CredentialNamespace::for_tenant(root, &TenantId::parse("clinic-a").unwrap());
        let b = CredentialNamespace::for_tenant(root, &TenantId::parse("clinic-b").unwrap());
        assert_ne!(a, b);
        assert_eq!(a.dir(), Path::new("/srv/sessions/clinic-a"));
        assert_eq!(b.file("creds.json"), Path::new("/srv/sessions/clinic-b/creds.json"));
    }

    #[tokio::test]
    async fn ensure_creates_nested_directory() {
        let root = tempfile::tempdir().unwrap();
        let ns = CredentialNamespace::for_tenant(&root.path().join("sessions"), &TenantId::parse("u1").unwrap());
        ns.ensure().await.unwrap();
        ns.ensure().await.unwrap();
        assert!(ns.dir().is_dir());
    }
}
