//! Environment-sourced runtime settings.
//!
//! Every numeric knob goes through [`resolve_bounded`], which never fails: a
//! missing value falls back to the default, garbage falls back to the default,
//! and out-of-range values are clamped. Each resolution carries a
//! [`Diagnostic`] so callers (and `config show`) can report what happened.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, warn};

/// Session max-age (hours).
pub const SESSION_MAX_AGE_ENV: &str = "PJE_SESSION_MAX_AGE_HOURS";
/// Request timeout handed to the network layer (seconds).
pub const TIMEOUT_ENV: &str = "PJE_TIMEOUT_SECONDS";
/// Retry attempts handed to the network layer.
pub const RETRY_ATTEMPTS_ENV: &str = "PJE_RETRY_ATTEMPTS";
/// Default profile name.
pub const SESSION_NAME_ENV: &str = "PJE_SESSION_NAME";
/// Session root directory override.
pub const SESSION_DIR_ENV: &str = "PJE_SESSION_DIR";

pub const DEFAULT_SESSION_MAX_AGE_HOURS: f64 = 8.0;
pub const MIN_SESSION_MAX_AGE_HOURS: f64 = 0.01;

pub const DEFAULT_TIMEOUT_SECONDS: i64 = 60;
pub const MIN_TIMEOUT_SECONDS: i64 = 5;
pub const MAX_TIMEOUT_SECONDS: i64 = 300;

pub const DEFAULT_RETRY_ATTEMPTS: i64 = 3;
pub const MIN_RETRY_ATTEMPTS: i64 = 1;
pub const MAX_RETRY_ATTEMPTS: i64 = 10;

pub const DEFAULT_PROFILE: &str = "tjes_pje_default";

const APP_DIR_NAME: &str = "pje-auth";
const SESSIONS_DIR_NAME: &str = "sessions";

/// What happened while resolving a bounded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// No raw value was supplied.
    UsingDefault,
    /// The raw value did not parse.
    InvalidValue,
    /// The parsed value was below the minimum.
    ClampedToMinimum,
    /// The parsed value was above the maximum.
    ClampedToMaximum,
    /// The parsed value was used as-is.
    Accepted,
}

impl Diagnostic {
    /// Human-readable label used in logs and `config show`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UsingDefault => "using default",
            Self::InvalidValue => "invalid value, using default",
            Self::ClampedToMinimum => "clamped to minimum",
            Self::ClampedToMaximum => "clamped to maximum",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved value together with the diagnostic explaining it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub diagnostic: Diagnostic,
}

/// Values that can be read from a raw environment string and range-checked.
pub trait BoundedValue: Copy + PartialOrd + fmt::Display {
    /// Parses a trimmed raw string; `None` means the value is unusable.
    fn parse_raw(raw: &str) -> Option<Self>;
}

impl BoundedValue for i64 {
    fn parse_raw(raw: &str) -> Option<Self> {
        i64::from_str(raw).ok()
    }
}

impl BoundedValue for f64 {
    fn parse_raw(raw: &str) -> Option<Self> {
        f64::from_str(raw).ok().filter(|value| value.is_finite())
    }
}

/// Resolves an optional raw value into a value inside `[min, max]`.
///
/// Never fails. Blank input is treated as absent. The diagnostic is also
/// emitted through `tracing` (`debug` for defaults and accepted values,
/// `warn` for invalid or clamped input).
pub fn resolve_bounded<T: BoundedValue>(
    name: &str,
    raw: Option<&str>,
    default: T,
    min: T,
    max: Option<T>,
) -> Resolved<T> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty());

    let Some(raw) = raw else {
        debug!(setting = name, %default, "{}", Diagnostic::UsingDefault);
        return Resolved {
            value: default,
            diagnostic: Diagnostic::UsingDefault,
        };
    };

    let Some(parsed) = T::parse_raw(raw) else {
        warn!(setting = name, raw, %default, "{}", Diagnostic::InvalidValue);
        return Resolved {
            value: default,
            diagnostic: Diagnostic::InvalidValue,
        };
    };

    if parsed < min {
        warn!(setting = name, value = %parsed, %min, "{}", Diagnostic::ClampedToMinimum);
        return Resolved {
            value: min,
            diagnostic: Diagnostic::ClampedToMinimum,
        };
    }

    if let Some(max) = max
        && parsed > max
    {
        warn!(setting = name, value = %parsed, %max, "{}", Diagnostic::ClampedToMaximum);
        return Resolved {
            value: max,
            diagnostic: Diagnostic::ClampedToMaximum,
        };
    }

    debug!(setting = name, value = %parsed, "{}", Diagnostic::Accepted);
    Resolved {
        value: parsed,
        diagnostic: Diagnostic::Accepted,
    }
}

/// Integer form of [`resolve_bounded`].
pub fn resolve_bounded_int(
    name: &str,
    raw: Option<&str>,
    default: i64,
    min: i64,
    max: Option<i64>,
) -> Resolved<i64> {
    resolve_bounded(name, raw, default, min, max)
}

/// Reads `name` from the process environment and resolves it.
pub fn resolve_env<T: BoundedValue>(name: &str, default: T, min: T, max: Option<T>) -> Resolved<T> {
    let raw = env::var_os(name).map(|value| value.to_string_lossy().into_owned());
    resolve_bounded(name, raw.as_deref(), default, min, max)
}

/// All settings this crate reads from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub session_max_age_hours: Resolved<f64>,
    pub timeout_seconds: Resolved<i64>,
    pub retry_attempts: Resolved<i64>,
    pub default_profile: String,
    /// `None` when no usable home/cache directory could be found.
    pub session_root: Option<PathBuf>,
}

impl RuntimeSettings {
    /// Resolves every setting from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let session_max_age_hours = resolve_env(
            SESSION_MAX_AGE_ENV,
            DEFAULT_SESSION_MAX_AGE_HOURS,
            MIN_SESSION_MAX_AGE_HOURS,
            None,
        );
        let timeout_seconds = resolve_env(
            TIMEOUT_ENV,
            DEFAULT_TIMEOUT_SECONDS,
            MIN_TIMEOUT_SECONDS,
            Some(MAX_TIMEOUT_SECONDS),
        );
        let retry_attempts = resolve_env(
            RETRY_ATTEMPTS_ENV,
            DEFAULT_RETRY_ATTEMPTS,
            MIN_RETRY_ATTEMPTS,
            Some(MAX_RETRY_ATTEMPTS),
        );

        let default_profile = env::var(SESSION_NAME_ENV)
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let session_root = sanitize_env_path(env::var_os(SESSION_DIR_ENV)).or_else(|| {
            resolve_cache_dir(
                sanitize_env_path(env::var_os("XDG_CACHE_HOME")),
                sanitize_env_path(env::var_os("HOME")),
                sanitize_env_path(env::var_os("LOCALAPPDATA")),
            )
        });

        Self {
            session_max_age_hours,
            timeout_seconds,
            retry_attempts,
            default_profile,
            session_root,
        }
    }
}

/// Expands a leading `~` to `$HOME`.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let home = sanitize_env_path(env::var_os("HOME"));
    match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

pub(crate) fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_cache_dir(
    xdg_cache_home: Option<PathBuf>,
    home: Option<PathBuf>,
    local_app_data: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(xdg) = xdg_cache_home {
        return Some(xdg.join(APP_DIR_NAME).join(SESSIONS_DIR_NAME));
    }
    if let Some(home) = home {
        return Some(
            home.join(".cache")
                .join(APP_DIR_NAME)
                .join(SESSIONS_DIR_NAME),
        );
    }
    local_app_data.map(|dir| dir.join(APP_DIR_NAME).join(SESSIONS_DIR_NAME))
}
