//! Session status surface for callers and the CLI.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};

use super::{AuthMethod, Session};

/// Result of inspecting a profile's stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No usable session is stored (never saved, cleared, or corrupted).
    Absent,
    /// A session exists and is inside its max-age window.
    Valid {
        auth_method: AuthMethod,
        created_at: DateTime<Utc>,
        last_used_at: DateTime<Utc>,
        age: TimeDelta,
        remaining: TimeDelta,
    },
    /// A session exists but is past its max-age.
    Expired {
        auth_method: AuthMethod,
        created_at: DateTime<Utc>,
        age: TimeDelta,
    },
}

impl SessionStatus {
    pub(crate) fn from_session(session: &Session, now: DateTime<Utc>) -> Self {
        let age = session.age_at(now);
        if session.is_valid_at(now) {
            Self::Valid {
                auth_method: session.auth_method,
                created_at: session.created_at,
                last_used_at: session.last_used_at,
                age,
                remaining: session.max_age - age,
            }
        } else {
            Self::Expired {
                auth_method: session.auth_method,
                created_at: session.created_at,
                age,
            }
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Short machine-friendly state label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Valid { .. } => "valid",
            Self::Expired { .. } => "expired",
        }
    }

    /// One-line human status.
    #[must_use]
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Absent => "No session found",
            Self::Valid { .. } => "Session valid and active",
            Self::Expired { .. } => "Session expired",
        }
    }
}

/// Formats an age as whole minutes, hours, or days.
#[must_use]
pub fn format_age(age: TimeDelta) -> String {
    let age = age.max(TimeDelta::zero());
    if age < TimeDelta::hours(1) {
        plural(age.num_minutes(), "minute")
    } else if age < TimeDelta::days(1) {
        plural(age.num_hours(), "hour")
    } else {
        plural(age.num_days(), "day")
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Renders the operator-facing status report for one profile.
#[must_use]
pub fn render_status_report(
    profile: &str,
    profile_dir: &Path,
    status: &SessionStatus,
    max_age: TimeDelta,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status: {}", status.headline());
    let _ = writeln!(out, "Profile: {profile}");
    let _ = writeln!(out, "Directory: {}", profile_dir.display());

    match status {
        SessionStatus::Absent => {
            out.push('\n');
            out.push_str("You have not authenticated yet:\n");
            out.push_str("  1. Start the authentication flow (certificate or cloud identity)\n");
            out.push_str("  2. Complete the login in the browser\n");
            out.push_str("  3. The session is saved automatically\n");
        }
        SessionStatus::Valid {
            auth_method,
            created_at,
            last_used_at,
            age,
            remaining,
        } => {
            let _ = writeln!(out, "Auth method: {auth_method}");
            let _ = writeln!(out, "Created: {}", created_at.to_rfc3339());
            let _ = writeln!(out, "Last used: {}", last_used_at.to_rfc3339());
            let _ = writeln!(out, "Age: {}", format_age(*age));
            let _ = writeln!(out, "Remaining: {}", format_age(*remaining));
            let _ = writeln!(out, "Max age: {}", format_max_age(max_age));
        }
        SessionStatus::Expired {
            auth_method,
            created_at,
            age,
        } => {
            let _ = writeln!(out, "Auth method: {auth_method}");
            let _ = writeln!(out, "Created: {}", created_at.to_rfc3339());
            let _ = writeln!(out, "Age: {}", format_age(*age));
            let _ = writeln!(out, "Max age: {}", format_max_age(max_age));
            out.push('\n');
            out.push_str("You had a session but it expired; authenticate again to create a new one.\n");
        }
    }

    out
}

#[allow(clippy::cast_precision_loss)]
fn format_max_age(max_age: TimeDelta) -> String {
    let hours = max_age.num_milliseconds() as f64 / 3_600_000.0;
    format!("{hours} hours")
}
