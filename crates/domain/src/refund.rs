//! Refund eligibility policy.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Why a refund request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RefundIneligibility {
    /// The refund window after order creation has closed.
    WindowElapsed { deadline: DateTime<Utc> },
    /// The event is too close (or already started).
    TooCloseToEvent {
        event_starts_at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    },
}

impl fmt::Display for RefundIneligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefundIneligibility::WindowElapsed { deadline } => {
                write!(f, "refund window closed at {}", deadline.to_rfc3339())
            }
            RefundIneligibility::TooCloseToEvent { cutoff, .. } => {
                write!(f, "refunds closed at {} ahead of the event", cutoff.to_rfc3339())
            }
        }
    }
}

/// When a paid order may enter `refund_pending`.
///
/// A request is eligible when it is made no later than `window` after the
/// order was created and strictly more than `cutoff_before_event` before
/// the event starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPolicy {
    pub window: Duration,
    pub cutoff_before_event: Duration,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(7),
            cutoff_before_event: Duration::hours(48),
        }
    }
}

impl RefundPolicy {
    pub fn new(window: Duration, cutoff_before_event: Duration) -> Self {
        Self {
            window,
            cutoff_before_event,
        }
    }

    /// Checks a refund request made at `now`.
    pub fn check(
        &self,
        created_at: DateTime<Utc>,
        event_starts_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RefundIneligibility> {
        let deadline = created_at + self.window;
        if now > deadline {
            return Err(RefundIneligibility::WindowElapsed { deadline });
        }

        let cutoff = event_starts_at - self.cutoff_before_event;
        if now >= cutoff {
            return Err(RefundIneligibility::TooCloseToEvent {
                event_starts_at,
                cutoff,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::hours(hours)
    }

    #[test]
    fn eligible_inside_window_and_before_cutoff() {
        let policy = RefundPolicy::default();
        assert!(policy.check(at(0), at(24 * 30), at(24)).is_ok());
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let policy = RefundPolicy::default();
        assert!(policy.check(at(0), at(24 * 30), at(24 * 7)).is_ok());
        assert!(matches!(
            policy.check(at(0), at(24 * 30), at(24 * 7 + 1)),
            Err(RefundIneligibility::WindowElapsed { .. })
        ));
    }

    #[test]
    fn exactly_at_cutoff_is_too_late() {
        let policy = RefundPolicy::default();
        let event = at(72);
        assert!(policy.check(at(0), event, at(23)).is_ok());
        assert!(matches!(
            policy.check(at(0), event, at(24)),
            Err(RefundIneligibility::TooCloseToEvent { .. })
        ));
    }

    #[test]
    fn past_event_is_ineligible() {
        let policy = RefundPolicy::default();
        assert!(policy.check(at(0), at(1), at(2)).is_err());
    }
}
