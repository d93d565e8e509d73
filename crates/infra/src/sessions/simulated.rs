//! Stand-in messaging transport for development and demos.
//!
//! First connect for a tenant emits a random pairing challenge and completes
//! pairing after a delay, leaving a credential marker in the tenant's
//! namespace. Later connects find the marker and go straight to ready.
//! Sends are only logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use remindd_core::{Destination, TenantId};

use super::transport::{
    CredentialNamespace, MessagingClient, MessagingTransport, TransportError, TransportEvent,
};

const CREDENTIAL_MARKER: &str = "credentials.json";

#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    pairing_delay: Duration,
}

impl SimulatedTransport {
    pub fn new(pairing_delay: Duration) -> Self {
        Self { pairing_delay }
    }
}

impl MessagingTransport for SimulatedTransport {
    fn create_client(
        &self,
        tenant_id: &TenantId,
        credentials: CredentialNamespace,
        events: UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn MessagingClient>, TransportError> {
        Ok(Arc::new(SimulatedClient {
            tenant_id: tenant_id.clone(),
            credentials,
            events,
            pairing_delay: self.pairing_delay,
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
pub struct SimulatedClient {
    tenant_id: TenantId,
    credentials: CredentialNamespace,
    events: UnboundedSender<TransportEvent>,
    pairing_delay: Duration,
    closed: AtomicBool,
}

impl SimulatedClient {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(tenant_id = %self.tenant_id, "session controller gone; event dropped");
        }
    }
}

#[async_trait]
impl MessagingClient for SimulatedClient {
    async fn connect(&self) -> Result<(), TransportError> {
        self.credentials.ensure().await?;
        let marker = self.credentials.file(CREDENTIAL_MARKER);

        if tokio::fs::try_exists(&marker).await? {
            tracing::info!(tenant_id = %self.tenant_id, "reusing stored credentials");
            self.emit(TransportEvent::Ready);
            return Ok(());
        }

        let challenge = format!("remindd-pair:{}", Uuid::now_v7().simple());
        self.emit(TransportEvent::PairingChallenge(challenge));
        tokio::time::sleep(self.pairing_delay).await;

        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let record = serde_json::json!({
            "tenantId": self.tenant_id.as_str(),
            "pairedAt": Utc::now(),
        });
        tokio::fs::write(&marker, record.to_string()).await?;
        self.emit(TransportEvent::Ready);
        Ok(())
    }

    async fn send_message(&self, destination: &Destination, body: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        tracing::info!(
            tenant_id = %self.tenant_id,
            destination = %destination,
            chars = body.chars().count(),
            "simulated message sent"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
