use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{StatusCode, request::Parts},
    response::Response,
};
use serde::Deserialize;

use remindd_core::TenantId;

use crate::app::errors::json_error;

/// Tenant context for a request.
///
/// Every tenant-scoped route resolves one of these before touching the queue
/// or the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// Validate a raw tenant id taken from a body or query string.
    pub fn from_raw(raw: Option<&str>) -> Result<Self, Response> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            json_error(StatusCode::BAD_REQUEST, "missing_tenant", "tenantId is required")
        })?;
        TenantId::parse(raw)
            .map(Self::new)
            .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_tenant", e.to_string()))
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

#[derive(Debug, Deserialize)]
struct TenantQuery {
    #[serde(rename = "tenantId", alias = "userId")]
    tenant_id: Option<String>,
}

/// `?tenantId=` (or `?userId=`) on GET routes and stream upgrades.
#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<TenantQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()))?;
        Self::from_raw(query.tenant_id.as_deref())
    }
}
