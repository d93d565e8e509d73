use remindd_core::TenantId;

use crate::StatusEvent;

/// Helper trait for tenant-scoped messages.
///
/// Marks types that carry the tenant they belong to, so routing layers
/// (fan-out rooms, filters) can deliver them without knowing their shape.
pub trait TenantScoped {
    fn tenant_id(&self) -> &TenantId;
}

impl TenantScoped for StatusEvent {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}
