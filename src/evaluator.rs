// Expiry evaluator - pure classification of a certificate's urgency
//
// Deterministic given its inputs; all timing state lives with the caller.

use crate::error::ReadError;
use crate::reader::CertificateSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How close a certificate is to expiry, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyState {
    /// More than `threshold_days` of validity remain
    Healthy,
    /// Within the warning window but not yet expired
    Warning,
    /// `not_after` has passed (or passes within the current day)
    Expired,
    /// The source could not be read or parsed this cycle
    Unreadable,
}

impl fmt::Display for UrgencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UrgencyState::Healthy => "healthy",
            UrgencyState::Warning => "warning",
            UrgencyState::Expired => "expired",
            UrgencyState::Unreadable => "unreadable",
        };
        write!(f, "{}", s)
    }
}

/// Result of evaluating one certificate at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: UrgencyState,
    /// Whole days until `not_after`; negative once expired, absent when the
    /// certificate could not be read
    pub days_remaining: Option<i64>,
}

/// Classify a certificate's urgency at `now`
///
/// Boundaries are inclusive: exactly `threshold_days` remaining is a
/// `Warning`, zero or fewer days remaining is `Expired`.
pub fn evaluate(
    now: DateTime<Utc>,
    outcome: &Result<CertificateSnapshot, ReadError>,
    threshold_days: i64,
) -> Evaluation {
    let snapshot = match outcome {
        Ok(snapshot) => snapshot,
        Err(_) => {
            return Evaluation {
                state: UrgencyState::Unreadable,
                days_remaining: None,
            };
        }
    };

    let days_remaining = (snapshot.not_after - now).num_days();

    let state = if days_remaining <= 0 {
        UrgencyState::Expired
    } else if days_remaining <= threshold_days {
        UrgencyState::Warning
    } else {
        UrgencyState::Healthy
    };

    Evaluation {
        state,
        days_remaining: Some(days_remaining),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn snapshot(not_after: DateTime<Utc>) -> Result<CertificateSnapshot, ReadError> {
        Ok(CertificateSnapshot {
            subject: "CN=test".to_string(),
            issuer: "CN=test-ca".to_string(),
            not_after,
            serial: None,
        })
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_healthy_above_threshold() {
        let now = fixed_now();
        let eval = evaluate(now, &snapshot(now + Duration::days(8)), 7);
        assert_eq!(eval.state, UrgencyState::Healthy);
        assert_eq!(eval.days_remaining, Some(8));
    }

    #[test]
    fn test_warning_at_exact_threshold() {
        let now = fixed_now();
        let eval = evaluate(now, &snapshot(now + Duration::days(7)), 7);
        assert_eq!(eval.state, UrgencyState::Warning);
        assert_eq!(eval.days_remaining, Some(7));
    }

    #[test]
    fn test_warning_inside_window() {
        let now = fixed_now();
        let eval = evaluate(now, &snapshot(now + Duration::days(5)), 7);
        assert_eq!(eval.state, UrgencyState::Warning);
        assert_eq!(eval.days_remaining, Some(5));
    }

    #[test]
    fn test_expired_at_zero_days() {
        let now = fixed_now();
        // 12 hours of validity left rounds down to zero whole days
        let eval = evaluate(now, &snapshot(now + Duration::hours(12)), 7);
        assert_eq!(eval.state, UrgencyState::Expired);
        assert_eq!(eval.days_remaining, Some(0));
    }

    #[test]
    fn test_expired_negative_days() {
        let now = fixed_now();
        let eval = evaluate(now, &snapshot(now - Duration::days(3)), 7);
        assert_eq!(eval.state, UrgencyState::Expired);
        assert_eq!(eval.days_remaining, Some(-3));
    }

    #[test]
    fn test_unreadable_on_read_error() {
        let outcome: Result<CertificateSnapshot, ReadError> = Err(ReadError::ParseFailure {
            details: "garbage".to_string(),
        });
        let eval = evaluate(fixed_now(), &outcome, 7);
        assert_eq!(eval.state, UrgencyState::Unreadable);
        assert_eq!(eval.days_remaining, None);
    }

    #[test]
    fn test_deterministic() {
        let now = fixed_now();
        let outcome = snapshot(now + Duration::days(5));
        let first = evaluate(now, &outcome, 7);
        let second = evaluate(now, &outcome, 7);
        assert_eq!(first, second);
    }

    #[test]
    fn test_days_remaining_sign_matches_expiry_side() {
        let now = fixed_now();
        for offset in [-30i64, -1, 1, 30, 365] {
            let eval = evaluate(now, &snapshot(now + Duration::days(offset)), 7);
            let days = eval.days_remaining.unwrap();
            assert_eq!(days.signum(), offset.signum());
        }
    }

    #[test]
    fn test_state_serialization_lowercase() {
        assert_eq!(
            serde_json::to_string(&UrgencyState::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(
            serde_json::to_string(&UrgencyState::Unreadable).unwrap(),
            "\"unreadable\""
        );
    }
}
