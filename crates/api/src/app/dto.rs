use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;

use remindd_core::{
    Destination, DispatchBasis, DomainError, DomainResult, ReminderId, TenantId, dispatch_at,
};
use remindd_infra::AppConfig;
use remindd_infra::jobs::ReminderJob;

// -------------------------
// Request DTOs
// -------------------------

/// Identifier-like field that front-ends send either as a string or a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    pub fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

fn text(field: Option<Scalar>) -> Option<String> {
    field
        .map(Scalar::into_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// One entry of `POST /batch-schedule-reminders`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderRequest {
    pub id: Option<Scalar>,
    #[serde(alias = "userId")]
    pub tenant_id: Option<Scalar>,
    #[serde(alias = "cellphone", alias = "number")]
    pub destination: Option<Scalar>,
    #[serde(alias = "message")]
    pub body: Option<String>,
    #[serde(alias = "whatsappReminder")]
    pub dispatch_basis: Option<String>,
    pub date: Option<String>,
    pub start_hour: Option<String>,
}

/// Deployment settings that shape how entries become jobs.
#[derive(Debug, Clone, Default)]
pub struct IngressPolicy {
    pub country_code: Option<String>,
    pub appointment_offset: Option<FixedOffset>,
}

impl From<&AppConfig> for IngressPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            country_code: cfg.default_country_code.clone(),
            appointment_offset: cfg.appointment_offset,
        }
    }
}

impl ReminderRequest {
    /// Validate and build the job. `Ok(None)` means the entry asked for no reminder.
    pub fn into_job(self, policy: &IngressPolicy, now: DateTime<Utc>) -> DomainResult<Option<ReminderJob>> {
        let tenant_id = text(self.tenant_id)
            .ok_or_else(|| DomainError::missing("tenantId"))
            .and_then(TenantId::parse)?;
        let id = text(self.id)
            .ok_or_else(|| DomainError::missing("id"))
            .and_then(ReminderId::parse)?;
        let destination = text(self.destination)
            .ok_or_else(|| DomainError::missing("destination"))?;
        let destination = Destination::normalize(&destination, policy.country_code.as_deref())?;
        let body = self
            .body
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| DomainError::missing("body"))?;
        let basis = self
            .dispatch_basis
            .ok_or_else(|| DomainError::missing("dispatchBasis"))?;
        let basis = DispatchBasis::parse(&basis)?;

        let Some(at) = dispatch_at(
            basis,
            self.date.as_deref(),
            self.start_hour.as_deref(),
            policy.appointment_offset,
            now,
        )?
        else {
            return Ok(None);
        };

        Ok(Some(ReminderJob::new(id, tenant_id, destination, body, at)))
    }
}

/// `POST /cancel-reminder`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelRequest {
    pub id: Option<Scalar>,
    #[serde(alias = "userId")]
    pub tenant_id: Option<Scalar>,
}

impl CancelRequest {
    pub fn tenant(&self) -> Option<String> {
        text(self.tenant_id.clone())
    }

    pub fn reminder_id(&self) -> Option<String> {
        text(self.id.clone())
    }
}

/// `POST /connect` and `POST /disconnect`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantRequest {
    #[serde(alias = "userId")]
    pub tenant_id: Option<Scalar>,
}

impl TenantRequest {
    pub fn tenant(&self) -> Option<String> {
        text(self.tenant_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use remindd_infra::jobs::ReminderState;

    fn policy() -> IngressPolicy {
        IngressPolicy {
            country_code: Some("55".into()),
            appointment_offset: FixedOffset::west_opt(3 * 3600),
        }
    }

    fn parse(value: serde_json::Value) -> ReminderRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn canonical_entry_sends_now() {
        let now = Utc::now();
        let job = parse(json!({
            "id": "a1",
            "tenantId": "u1",
            "destination": "5599999999",
            "body": "hi",
            "dispatchBasis": "now",
        }))
        .into_job(&IngressPolicy::default(), now)
        .unwrap()
        .unwrap();

        assert_eq!(job.id.as_str(), "a1");
        assert_eq!(job.tenant_id.as_str(), "u1");
        assert_eq!(job.destination.as_str(), "5599999999");
        assert_eq!(job.dispatch_at, now);
        assert_eq!(job.state, ReminderState::Scheduled);
    }

    #[test]
    fn legacy_field_names_and_hours_before() {
        let now = Utc::now();
        let job = parse(json!({
            "id": 42,
            "userId": "clinic-7",
            "cellphone": "(11) 98888-7777",
            "message": "Lembrete da sua consulta",
            "whatsappReminder": "24 horas antes",
            "date": "2030-05-10",
            "startHour": "14:30",
        }))
        .into_job(&policy(), now)
        .unwrap()
        .unwrap();

        assert_eq!(job.id.as_str(), "42");
        assert_eq!(job.destination.as_str(), "5511988887777");
        let expected = Utc.with_ymd_and_hms(2030, 5, 9, 17, 30, 0).unwrap();
        assert_eq!(job.dispatch_at, expected);
        assert_eq!(job.dispatch_at, Utc.with_ymd_and_hms(2030, 5, 10, 17, 30, 0).unwrap() - Duration::hours(24));
    }

    #[test]
    fn disabled_basis_is_skipped_not_rejected() {
        let outcome = parse(json!({
            "id": "a1", "tenantId": "u1", "destination": "5599999999",
            "body": "hi", "dispatchBasis": "Sem lembrete",
        }))
        .into_job(&policy(), Utc::now())
        .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn missing_or_malformed_fields_are_rejected() {
        let base = json!({
            "id": "a1", "tenantId": "u1", "destination": "5599999999",
            "body": "hi", "dispatchBasis": "2", "date": "2030-01-01", "startHour": "09:00",
        });
        for (field, value) in [
            ("tenantId", json!(null)),
            ("tenantId", json!("../etc")),
            ("id", json!("")),
            ("destination", json!("123")),
            ("body", json!("   ")),
            ("dispatchBasis", json!(null)),
            ("dispatchBasis", json!("whenever")),
            ("date", json!("10/01/2030")),
            ("startHour", json!(null)),
        ] {
            let mut entry = base.clone();
            entry[field] = value.clone();
            let result = parse(entry).into_job(&policy(), Utc::now());
            assert!(result.is_err(), "{field} = {value} should be rejected");
        }
    }

    #[test]
    fn absurd_lead_time_is_a_rejected_entry() {
        let result = parse(json!({
            "id": "a1", "tenantId": "u1", "destination": "5599999999", "body": "hi",
            "dispatchBasis": "4000000000 horas antes", "date": "2026-03-10", "startHour": "14:30",
        }))
        .into_job(&policy(), Utc::now());
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn tenant_request_accepts_both_spellings() {
        let a: TenantRequest = serde_json::from_value(json!({ "tenantId": "u1" })).unwrap();
        let b: TenantRequest = serde_json::from_value(json!({ "userId": "u1" })).unwrap();
        let c: TenantRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(a.tenant().as_deref(), Some("u1"));
        assert_eq!(b.tenant().as_deref(), Some("u1"));
        assert!(c.tenant().is_none());
    }
}
