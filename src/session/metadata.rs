//! `metadata.json` schema and its invariants.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::AuthMethod;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionMetadata {
    pub(crate) profile_name: String,
    pub(crate) auth_method: AuthMethod,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_used_at: DateTime<Utc>,
    pub(crate) max_age_hours: f64,
}

impl SessionMetadata {
    pub(crate) fn new(profile: &str, auth_method: AuthMethod, now: DateTime<Utc>, max_age: TimeDelta) -> Self {
        Self {
            profile_name: profile.to_string(),
            auth_method,
            created_at: now,
            last_used_at: now,
            max_age_hours: hours_from_delta(max_age),
        }
    }

    /// Checks the invariants a loaded record must satisfy; the error string
    /// names the first violation.
    pub(crate) fn check(&self, profile: &str) -> Result<(), String> {
        if self.profile_name != profile {
            return Err(format!(
                "metadata belongs to profile '{}', not '{profile}'",
                self.profile_name
            ));
        }
        if !self.max_age_hours.is_finite() || self.max_age_hours <= 0.0 {
            return Err(format!("max_age_hours must be positive, got {}", self.max_age_hours));
        }
        if self.last_used_at < self.created_at {
            return Err("last_used_at precedes created_at".to_string());
        }
        Ok(())
    }
}

/// Converts fractional hours to a [`TimeDelta`], saturating on overflow.
/// NaN and infinities map to zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn delta_from_hours(hours: f64) -> TimeDelta {
    if !hours.is_finite() {
        return TimeDelta::zero();
    }
    let millis = (hours * 3_600_000.0).round();
    if millis >= i64::MAX as f64 {
        return TimeDelta::MAX;
    }
    if millis <= i64::MIN as f64 {
        return TimeDelta::MIN;
    }
    let fallback = if millis < 0.0 { TimeDelta::MIN } else { TimeDelta::MAX };
    TimeDelta::try_milliseconds(millis as i64).unwrap_or(fallback)
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn hours_from_delta(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 3_600_000.0
}
