//! Dispatch-time rules: how a reminder basis plus an appointment slot
//! becomes the instant a reminder is due.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::{DomainError, DomainResult};

/// When a reminder should go out, relative to its appointment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchBasis {
    /// Send on the next scheduler tick.
    Now,
    /// Send N hours before the appointment starts.
    HoursBefore(u32),
    /// No reminder requested; the entry is skipped.
    Disabled,
}

impl DispatchBasis {
    /// Parse the labels front-ends send.
    ///
    /// Accepts `now`/`send_now`/`Enviar agora`, `none`/`Sem lembrete`/empty,
    /// and any label starting with an hour count (`"24"`, `"2 horas antes"`).
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let label = raw.trim().to_lowercase();
        match label.as_str() {
            "" | "none" | "disabled" | "sem lembrete" => return Ok(Self::Disabled),
            "now" | "send_now" | "immediately" | "enviar agora" => return Ok(Self::Now),
            _ => {}
        }

        let digits: String = label.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(DomainError::validation(format!(
                "unrecognized dispatch basis: {raw:?}"
            )));
        }
        let hours = digits
            .parse::<u32>()
            .map_err(|e| DomainError::validation(format!("hour count out of range: {e}")))?;
        Ok(Self::HoursBefore(hours))
    }
}

/// Resolve an appointment's start (`YYYY-MM-DD` + `HH:MM[:SS]`) to UTC.
///
/// Without an explicit offset the server's local zone is used.
pub fn appointment_start(
    date: &str,
    start_hour: &str,
    offset: Option<FixedOffset>,
) -> DomainResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| DomainError::validation(format!("invalid date: {e}")))?;
    let start_hour = start_hour.trim();
    let time = NaiveTime::parse_from_str(start_hour, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(start_hour, "%H:%M"))
        .map_err(|e| DomainError::validation(format!("invalid start hour: {e}")))?;
    let naive = NaiveDateTime::new(date, time);

    let resolved = match offset {
        Some(offset) => offset.from_local_datetime(&naive).earliest().map(|t| t.with_timezone(&Utc)),
        None => Local.from_local_datetime(&naive).earliest().map(|t| t.with_timezone(&Utc)),
    };
    resolved.ok_or_else(|| DomainError::validation("appointment time does not exist in zone"))
}

/// Compute when a reminder becomes due.
///
/// Returns `Ok(None)` when the basis disables the reminder. `date` and
/// `start_hour` are only consulted for [`DispatchBasis::HoursBefore`].
pub fn dispatch_at(
    basis: DispatchBasis,
    date: Option<&str>,
    start_hour: Option<&str>,
    offset: Option<FixedOffset>,
    now: DateTime<Utc>,
) -> DomainResult<Option<DateTime<Utc>>> {
    match basis {
        DispatchBasis::Disabled => Ok(None),
        DispatchBasis::Now => Ok(Some(now)),
        DispatchBasis::HoursBefore(hours) => {
            let date = date.ok_or_else(|| DomainError::missing("date"))?;
            let start_hour =
                start_hour.ok_or_else(|| DomainError::missing("startHour"))?;
            let start = appointment_start(date, start_hour, offset)?;
            let lead = Duration::try_hours(i64::from(hours))
                .ok_or_else(|| DomainError::validation("hour count out of range"))?;
            start.checked_sub_signed(lead).map(Some).ok_or_else(|| {
                DomainError::validation(format!("{hours} hours before the appointment is out of range"))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brt() -> Option<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
    }

    #[test]
    fn parses_known_labels() {
        assert_eq!(DispatchBasis::parse("Enviar agora").unwrap(), DispatchBasis::Now);
        assert_eq!(DispatchBasis::parse("now").unwrap(), DispatchBasis::Now);
        assert_eq!(DispatchBasis::parse("Sem lembrete").unwrap(), DispatchBasis::Disabled);
        assert_eq!(DispatchBasis::parse("  ").unwrap(), DispatchBasis::Disabled);
        assert_eq!(
            DispatchBasis::parse("24 horas antes").unwrap(),
            DispatchBasis::HoursBefore(24)
        );
        assert_eq!(DispatchBasis::parse("2").unwrap(), DispatchBasis::HoursBefore(2));
    }

    #[test]
    fn rejects_unknown_labels() {
        assert!(DispatchBasis::parse("tomorrow").is_err());
        assert!(DispatchBasis::parse("99999999999 hours").is_err());
    }

    #[test]
    fn huge_hour_count_is_rejected_not_panicking() {
        let basis = DispatchBasis::parse("4000000000 hours").unwrap();
        assert_eq!(basis, DispatchBasis::HoursBefore(4_000_000_000));
        let err = dispatch_at(basis, Some("2026-03-10"), Some("14:30"), brt(), Utc::now());
        assert!(matches!(err, Err(DomainError::Validation(_))));

        let err = dispatch_at(
            DispatchBasis::HoursBefore(u32::MAX),
            Some("2026-03-10"),
            Some("14:30"),
            None,
            Utc::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn hours_before_subtracts_from_appointment_in_offset() {
        let now = Utc::now();
        let at = dispatch_at(
            DispatchBasis::HoursBefore(24),
            Some("2026-03-10"),
            Some("14:30"),
            brt(),
            now,
        )
        .unwrap()
        .unwrap();
        // 14:30 at -03:00 is 17:30 UTC; one day earlier.
        assert_eq!(at.to_rfc3339(), "2026-03-09T17:30:00+00:00");
    }

    #[test]
    fn now_ignores_appointment_fields() {
        let now = Utc::now();
        let at = dispatch_at(DispatchBasis::Now, None, None, None, now).unwrap();
        assert_eq!(at, Some(now));
    }

    #[test]
    fn disabled_yields_none() {
        let at = dispatch_at(DispatchBasis::Disabled, None, None, None, Utc::now()).unwrap();
        assert!(at.is_none());
    }

    #[test]
    fn hours_before_requires_date_and_hour() {
        let err = dispatch_at(DispatchBasis::HoursBefore(1), None, Some("10:00"), brt(), Utc::now());
        assert_eq!(err, Err(DomainError::MissingField("date")));
        let err = dispatch_at(DispatchBasis::HoursBefore(1), Some("2026-13-01"), Some("10:00"), brt(), Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn accepts_seconds_in_start_hour() {
        let a = appointment_start("2026-01-01", "08:00:00", brt()).unwrap();
        let b = appointment_start("2026-01-01", "08:00", brt()).unwrap();
        assert_eq!(a, b);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: HoursBefore(n) is exactly n hours before the appointment start.
            #[test]
            fn hours_before_is_exact(hours in 0u32..=720, h in 0u32..24, m in 0u32..60) {
                let hour = format!("{h:02}:{m:02}");
                let start = appointment_start("2026-06-15", &hour, brt()).unwrap();
                let at = dispatch_at(
                    DispatchBasis::HoursBefore(hours),
                    Some("2026-06-15"),
                    Some(&hour),
                    brt(),
                    Utc::now(),
                ).unwrap().unwrap();
                prop_assert_eq!(start - at, Duration::hours(i64::from(hours)));
            }

            /// Property: any hour count yields a value or an error, never a panic.
            #[test]
            fn any_hour_count_is_total(hours in any::<u32>()) {
                let result = dispatch_at(
                    DispatchBasis::HoursBefore(hours),
                    Some("2026-06-15"),
                    Some("09:00"),
                    brt(),
                    Utc::now(),
                );
                if let Ok(Some(at)) = result {
                    prop_assert!(at <= appointment_start("2026-06-15", "09:00", brt()).unwrap());
                }
            }
        }
    }
}
