//! Configuration loading and representation.
//!
//! Everything comes from environment variables; unset variables fall back to
//! development defaults, malformed ones are a startup error.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

/// Configuration error raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Base URL front-ends use to reach this service (CORS origin when set).
    pub public_base_url: Option<String>,
    /// Reminder collection file.
    pub reminders_db_path: PathBuf,
    /// Root of the tenant-namespaced credential storage.
    pub sessions_dir: PathBuf,
    /// Dispatch loop poll interval.
    pub scheduler_interval: Duration,
    /// Upper bound for a single dispatch call.
    pub dispatch_timeout: Duration,
    /// Due reminders older than this with no ready session are failed.
    pub max_pending_age: Option<Duration>,
    /// Country code prefixed to destinations lacking it.
    pub default_country_code: Option<String>,
    /// Zone appointments are expressed in; `None` means server local time.
    pub appointment_offset: Option<FixedOffset>,
    /// Delay before the simulated transport completes pairing.
    pub simulated_pairing_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            public_base_url: None,
            reminders_db_path: PathBuf::from("data/reminders.json"),
            sessions_dir: PathBuf::from("sessions"),
            scheduler_interval: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
            max_pending_age: None,
            default_country_code: None,
            appointment_offset: None,
            simulated_pairing_delay: Duration::from_secs(20),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (tests inject a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("PORT") {
            cfg.port = v
                .parse()
                .map_err(|e| ConfigError::invalid("PORT", &v, format!("{e}")))?;
        }
        if let Some(v) = get("PUBLIC_BASE_URL") {
            cfg.public_base_url = Some(v.trim_end_matches('/').to_string());
        }
        if let Some(v) = get("REMINDERS_DB_PATH") {
            cfg.reminders_db_path = PathBuf::from(v);
        }
        if let Some(v) = get("SESSIONS_DIR") {
            cfg.sessions_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SCHEDULER_INTERVAL_SECS") {
            cfg.scheduler_interval = parse_secs("SCHEDULER_INTERVAL_SECS", &v, 1)?;
        }
        if let Some(v) = get("DISPATCH_TIMEOUT_SECS") {
            cfg.dispatch_timeout = parse_secs("DISPATCH_TIMEOUT_SECS", &v, 1)?;
        }
        if let Some(v) = get("REMINDER_MAX_PENDING_HOURS") {
            let hours: u64 = v
                .parse()
                .map_err(|e| ConfigError::invalid("REMINDER_MAX_PENDING_HOURS", &v, format!("{e}")))?;
            let secs = hours.checked_mul(3600).ok_or_else(|| {
                ConfigError::invalid("REMINDER_MAX_PENDING_HOURS", &v, "too large")
            })?;
            cfg.max_pending_age = Some(Duration::from_secs(secs));
        }
        if let Some(v) = get("DEFAULT_COUNTRY_CODE") {
            let cc = v.trim_start_matches('+');
            if cc.is_empty() || !cc.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::invalid("DEFAULT_COUNTRY_CODE", &v, "digits only"));
            }
            cfg.default_country_code = Some(cc.to_string());
        }
        if let Some(v) = get("APPOINTMENT_UTC_OFFSET") {
            cfg.appointment_offset = Some(parse_offset(&v)?);
        }
        if let Some(v) = get("SIMULATED_PAIRING_SECS") {
            cfg.simulated_pairing_delay = parse_secs("SIMULATED_PAIRING_SECS", &v, 0)?;
        }

        Ok(cfg)
    }
}

fn parse_secs(key: &'static str, value: &str, min: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = value
        .parse()
        .map_err(|e| ConfigError::invalid(key, value, format!("{e}")))?;
    if secs < min {
        return Err(ConfigError::invalid(key, value, format!("must be at least {min}")));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse `±HH:MM` (or `Z`/`UTC`).
fn parse_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    const KEY: &str = "APPOINTMENT_UTC_OFFSET";
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| ConfigError::invalid(KEY, value, "out of range"));
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(ConfigError::invalid(KEY, value, "expected ±HH:MM")),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| ConfigError::invalid(KEY, value, "expected ±HH:MM"))?;
    let hours: i32 = hours
        .parse()
        .map_err(|e| ConfigError::invalid(KEY, value, format!("{e}")))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|e| ConfigError::invalid(KEY, value, format!("{e}")))?;
    if !(0..60).contains(&minutes) {
        return Err(ConfigError::invalid(KEY, value, "minutes out of range"));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| ConfigError::invalid(KEY, value, "out of range"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_map(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.scheduler_interval, Duration::from_secs(30));
        assert!(cfg.max_pending_age.is_none());
        assert!(cfg.appointment_offset.is_none());
    }

    #[test]
    fn reads_all_knobs() {
        let cfg = from_map(&[
            ("PORT", "8081"),
            ("PUBLIC_BASE_URL", "https://clinic.example.com/"),
            ("REMINDERS_DB_PATH", "/var/lib/remindd/reminders.json"),
            ("SESSIONS_DIR", "/var/lib/remindd/sessions"),
            ("SCHEDULER_INTERVAL_SECS", "5"),
            ("DISPATCH_TIMEOUT_SECS", "10"),
            ("REMINDER_MAX_PENDING_HOURS", "48"),
            ("DEFAULT_COUNTRY_CODE", "+55"),
            ("APPOINTMENT_UTC_OFFSET", "-03:00"),
            ("SIMULATED_PAIRING_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.public_base_url.as_deref(), Some("https://clinic.example.com"));
        assert_eq!(cfg.sessions_dir, PathBuf::from("/var/lib/remindd/sessions"));
        assert_eq!(cfg.scheduler_interval, Duration::from_secs(5));
        assert_eq!(cfg.dispatch_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_pending_age, Some(Duration::from_secs(48 * 3600)));
        assert_eq!(cfg.default_country_code.as_deref(), Some("55"));
        assert_eq!(cfg.appointment_offset, FixedOffset::west_opt(3 * 3600));
        assert_eq!(cfg.simulated_pairing_delay, Duration::ZERO);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(from_map(&[("PORT", "http")]).is_err());
        assert!(from_map(&[("SCHEDULER_INTERVAL_SECS", "0")]).is_err());
        assert!(from_map(&[("DEFAULT_COUNTRY_CODE", "br")]).is_err());
        assert!(from_map(&[("APPOINTMENT_UTC_OFFSET", "03:00")]).is_err());
        assert!(from_map(&[("APPOINTMENT_UTC_OFFSET", "+03:75")]).is_err());
    }

    #[test]
    fn absurd_pending_bound_is_an_error_not_an_overflow() {
        let huge = u64::MAX.to_string();
        let err = from_map(&[("REMINDER_MAX_PENDING_HOURS", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("REMINDER_MAX_PENDING_HOURS"));
        let cfg = from_map(&[("REMINDER_MAX_PENDING_HOURS", "8760")]).unwrap();
        assert_eq!(cfg.max_pending_age, Some(Duration::from_secs(8760 * 3600)));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = from_map(&[("PORT", "  ")]).unwrap();
        assert_eq!(cfg.port, 3000);
    }
}
