//! Durable per-profile session storage.
//!
//! Each profile owns one directory under the store root holding three
//! artifacts: `cookies.json`, `state.json` and `metadata.json`. Every
//! artifact is replaced atomically (see [`durable`]), and a profile whose
//! artifacts are missing or unreadable is reported as not found rather than
//! as an error. Filesystem failures other than absence surface as
//! [`SessionError::Storage`].

pub mod cookies;
pub mod durable;
mod metadata;
pub mod status;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_SESSION_MAX_AGE_HOURS, RuntimeSettings};

pub use cookies::{SessionCookie, unique_domain_count};
pub use durable::{StagedWrite, write_durably};
pub use metadata::delta_from_hours;
pub use status::{SessionStatus, format_age, render_status_report};

use metadata::SessionMetadata;

pub const COOKIES_FILE: &str = "cookies.json";
pub const STATE_FILE: &str = "state.json";
pub const METADATA_FILE: &str = "metadata.json";
/// Persistent browser profile directory kept beside the artifacts.
pub const BROWSER_PROFILE_DIR: &str = "browser";

const MAX_PROFILE_LEN: usize = 64;
const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// How the stored session was originally authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Local identity bundle or hardware token.
    Certificate,
    /// Browser-mediated cloud identity flow.
    #[serde(alias = "safe_id")]
    CloudIdentity,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::CloudIdentity => "cloud_identity",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "certificate" | "cert" => Ok(Self::Certificate),
            "cloud_identity" | "cloud-identity" | "safe_id" => Ok(Self::CloudIdentity),
            other => Err(format!(
                "unknown auth method '{other}' (expected certificate or cloud-identity)"
            )),
        }
    }
}

/// A previously completed authentication, reusable until it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub profile_name: String,
    pub auth_method: AuthMethod,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub max_age: TimeDelta,
    pub cookies: Vec<SessionCookie>,
    /// Browser storage state, kept byte-for-byte as saved.
    pub storage_state: Vec<u8>,
}

impl Session {
    /// A session is valid while `now - created_at < max_age`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) < self.max_age
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Age at `now`; a creation time in the future counts as zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.created_at)
            .max(TimeDelta::zero())
    }

    /// Time left before expiry at `now`, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.max_age - self.age_at(now)).max(TimeDelta::zero())
    }
}

/// Errors raised by [`SessionStore`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Profile name would not map to a single directory under the root.
    #[error("invalid profile name '{0}' (use 1-64 letters, digits, '.', '_' or '-')")]
    InvalidProfile(String),
    /// No session root could be derived from the environment.
    #[error("unable to determine session directory (set PJE_SESSION_DIR, XDG_CACHE_HOME or HOME)")]
    RootUnavailable,
    /// Filesystem failure other than absence.
    #[error("session storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Session data could not be encoded.
    #[error("failed to serialize session data: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The storage state handed to `save` is not well-formed JSON.
    #[error("storage state is not well-formed JSON: {0}")]
    InvalidStorageState(#[source] serde_json::Error),
}

impl SessionError {
    fn storage(path: &Path, source: io::Error) -> Self {
        Self::Storage {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of [`SessionStore::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Removed,
    NotFound,
}

/// Result of [`SessionStore::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    Valid(Session),
    /// Artifacts are intact but the session is past its max-age.
    Expired(Session),
    NotFound,
}

/// Construction-time configuration for [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStoreConfig {
    pub root: PathBuf,
    pub max_age: TimeDelta,
}

impl SessionStoreConfig {
    /// Config rooted at `root` with the default max-age.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age: delta_from_hours(DEFAULT_SESSION_MAX_AGE_HOURS),
        }
    }

    /// Overrides the max-age. Non-positive values are ignored.
    #[must_use]
    pub fn with_max_age(mut self, max_age: TimeDelta) -> Self {
        if max_age > TimeDelta::zero() {
            self.max_age = max_age;
        } else {
            warn!(max_age_ms = max_age.num_milliseconds(), "ignoring non-positive session max-age");
        }
        self
    }

    #[must_use]
    pub fn with_max_age_hours(self, hours: f64) -> Self {
        self.with_max_age(delta_from_hours(hours))
    }

    /// Builds the config from environment-resolved settings.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RootUnavailable`] when no session root could be
    /// resolved.
    pub fn from_settings(settings: &RuntimeSettings) -> Result<Self, SessionError> {
        let root = settings
            .session_root
            .clone()
            .ok_or(SessionError::RootUnavailable)?;
        Ok(Self::new(root).with_max_age_hours(settings.session_max_age_hours.value))
    }
}

/// Checks that `profile` is usable as a single directory name.
///
/// # Errors
///
/// Returns [`SessionError::InvalidProfile`] otherwise.
pub fn validate_profile(profile: &str) -> Result<(), SessionError> {
    let well_formed = !profile.is_empty()
        && profile.len() <= MAX_PROFILE_LEN
        && profile != "."
        && profile != ".."
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if well_formed {
        Ok(())
    } else {
        Err(SessionError::InvalidProfile(profile.to_string()))
    }
}

/// Sole reader and writer of the on-disk session directories.
#[derive(Debug, Clone)]
pub struct SessionStore {
    config: SessionStoreConfig,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: SessionStoreConfig) -> Self {
        Self { config }
    }

    /// Store configured from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RootUnavailable`] when no root can be resolved.
    pub fn from_env() -> Result<Self, SessionError> {
        let settings = RuntimeSettings::from_env();
        Ok(Self::new(SessionStoreConfig::from_settings(&settings)?))
    }

    #[must_use]
    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    #[must_use]
    pub fn max_age(&self) -> TimeDelta {
        self.config.max_age
    }

    /// Directory holding `profile`'s artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidProfile`] for malformed names.
    pub fn profile_dir(&self, profile: &str) -> Result<PathBuf, SessionError> {
        validate_profile(profile)?;
        Ok(self.config.root.join(profile))
    }

    /// Reads the stored session for `profile`.
    ///
    /// Returns `Ok(None)` when the profile was never saved, was cleared, or has
    /// a missing or unparseable artifact. Expired sessions are returned; use
    /// [`Session::is_valid_at`] or [`SessionStore::lookup`] to tell them apart.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when an artifact exists but cannot be
    /// read, and [`SessionError::InvalidProfile`] for malformed names.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, profile: &str) -> Result<Option<Session>, SessionError> {
        let dir = self.profile_dir(profile)?;
        if !dir.is_dir() {
            debug!(profile, "no session directory");
            return Ok(None);
        }
        durable::correct_permissions(&dir, DIR_MODE);

        let metadata_bytes = read_artifact(&dir.join(METADATA_FILE))?;
        let cookie_bytes = read_artifact(&dir.join(COOKIES_FILE))?;
        let state_bytes = read_artifact(&dir.join(STATE_FILE))?;

        let (metadata_bytes, cookie_bytes, storage_state) =
            match (metadata_bytes, cookie_bytes, state_bytes) {
                (Some(meta), Some(cookies), Some(state)) => (meta, cookies, state),
                (None, None, None) => {
                    debug!(profile, "no session artifacts");
                    return Ok(None);
                }
                (meta, cookies, state) => {
                    warn!(
                        profile,
                        has_metadata = meta.is_some(),
                        has_cookies = cookies.is_some(),
                        has_state = state.is_some(),
                        "session is incomplete; treating as not found"
                    );
                    return Ok(None);
                }
            };

        let metadata: SessionMetadata = match serde_json::from_slice(&metadata_bytes) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(profile, artifact = METADATA_FILE, %error, "session is corrupted; treating as not found");
                return Ok(None);
            }
        };
        if let Err(reason) = metadata.check(profile) {
            warn!(profile, artifact = METADATA_FILE, %reason, "session is corrupted; treating as not found");
            return Ok(None);
        }

        let cookies: Vec<SessionCookie> = match serde_json::from_slice(&cookie_bytes) {
            Ok(cookies) => cookies,
            Err(error) => {
                warn!(profile, artifact = COOKIES_FILE, %error, "session is corrupted; treating as not found");
                return Ok(None);
            }
        };

        if let Err(error) = serde_json::from_slice::<serde::de::IgnoredAny>(&storage_state) {
            warn!(profile, artifact = STATE_FILE, %error, "session is corrupted; treating as not found");
            return Ok(None);
        }

        debug!(profile, cookies = cookies.len(), "session loaded");
        Ok(Some(Session {
            profile_name: metadata.profile_name,
            auth_method: metadata.auth_method,
            created_at: metadata.created_at,
            last_used_at: metadata.last_used_at,
            max_age: self.config.max_age,
            cookies,
            storage_state,
        }))
    }

    /// Loads `profile` and classifies it against the current time.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::load`].
    pub fn lookup(&self, profile: &str) -> Result<SessionLookup, SessionError> {
        self.lookup_at(profile, Utc::now())
    }

    /// [`SessionStore::lookup`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::load`].
    pub fn lookup_at(&self, profile: &str, now: DateTime<Utc>) -> Result<SessionLookup, SessionError> {
        Ok(match self.load(profile)? {
            Some(session) if session.is_valid_at(now) => SessionLookup::Valid(session),
            Some(session) => {
                info!(profile, created_at = %session.created_at, "session expired");
                SessionLookup::Expired(session)
            }
            None => SessionLookup::NotFound,
        })
    }

    /// Pure validity check against the current time.
    #[must_use]
    pub fn is_valid(session: &Session) -> bool {
        session.is_valid()
    }

    /// Persists a freshly authenticated session for `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStorageState`] when `storage_state` is not
    /// JSON, [`SessionError::Storage`] on filesystem failures, and
    /// [`SessionError::InvalidProfile`] for malformed names.
    pub fn save(
        &self,
        profile: &str,
        auth_method: AuthMethod,
        cookies: Vec<SessionCookie>,
        storage_state: Vec<u8>,
    ) -> Result<Session, SessionError> {
        self.save_at(profile, auth_method, cookies, storage_state, Utc::now())
    }

    /// [`SessionStore::save`] with an explicit creation time.
    ///
    /// The previous metadata is removed before anything else is written and
    /// the new metadata goes last, so a save cut short at any point reads as
    /// no session rather than a mix of old and new artifacts.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::save`].
    #[instrument(level = "debug", skip(self, cookies, storage_state))]
    pub fn save_at(
        &self,
        profile: &str,
        auth_method: AuthMethod,
        cookies: Vec<SessionCookie>,
        storage_state: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let dir = self.profile_dir(profile)?;
        serde_json::from_slice::<serde::de::IgnoredAny>(&storage_state)
            .map_err(SessionError::InvalidStorageState)?;

        let metadata = SessionMetadata::new(profile, auth_method, now, self.config.max_age);
        let cookie_json = serde_json::to_vec_pretty(&cookies)?;
        let metadata_json = serde_json::to_vec_pretty(&metadata)?;

        durable::ensure_private_dir(&dir).map_err(|error| SessionError::storage(&dir, error))?;
        remove_if_present(&dir.join(METADATA_FILE))?;
        write_artifact(&dir.join(COOKIES_FILE), &cookie_json)?;
        write_artifact(&dir.join(STATE_FILE), &storage_state)?;
        write_artifact(&dir.join(METADATA_FILE), &metadata_json)?;

        info!(
            profile,
            %auth_method,
            cookies = cookies.len(),
            domains = unique_domain_count(&cookies),
            "session saved"
        );

        Ok(Session {
            profile_name: metadata.profile_name,
            auth_method,
            created_at: metadata.created_at,
            last_used_at: metadata.last_used_at,
            max_age: self.config.max_age,
            cookies,
            storage_state,
        })
    }

    /// Records a reuse of `profile`'s session.
    ///
    /// Returns `false` (and writes nothing) when no readable session exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when metadata cannot be read or
    /// rewritten.
    pub fn touch(&self, profile: &str) -> Result<bool, SessionError> {
        self.touch_at(profile, Utc::now())
    }

    /// [`SessionStore::touch`] against an explicit clock.
    ///
    /// Cookies and storage state are left untouched; `last_used_at` never moves
    /// before `created_at`.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::touch`].
    #[instrument(level = "debug", skip(self))]
    pub fn touch_at(&self, profile: &str, now: DateTime<Utc>) -> Result<bool, SessionError> {
        let path = self.profile_dir(profile)?.join(METADATA_FILE);
        let Some(bytes) = read_artifact(&path)? else {
            debug!(profile, "nothing to touch");
            return Ok(false);
        };
        let mut metadata: SessionMetadata = match serde_json::from_slice(&bytes) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(profile, %error, "cannot touch corrupted session metadata");
                return Ok(false);
            }
        };
        if metadata.check(profile).is_err() {
            warn!(profile, "cannot touch corrupted session metadata");
            return Ok(false);
        }

        metadata.last_used_at = now.max(metadata.created_at);
        let json = serde_json::to_vec_pretty(&metadata)?;
        write_artifact(&path, &json)?;
        debug!(profile, last_used_at = %metadata.last_used_at, "session touched");
        Ok(true)
    }

    /// Deletes every artifact for `profile`.
    ///
    /// Idempotent: a profile with nothing stored reports
    /// [`ClearOutcome::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] when an existing artifact cannot be
    /// removed.
    #[instrument(level = "debug", skip(self))]
    pub fn clear(&self, profile: &str) -> Result<ClearOutcome, SessionError> {
        let dir = self.profile_dir(profile)?;
        if !dir.is_dir() {
            debug!(profile, "nothing to clear");
            return Ok(ClearOutcome::NotFound);
        }

        let mut removed = 0_usize;
        for name in [METADATA_FILE, COOKIES_FILE, STATE_FILE] {
            if remove_if_present(&dir.join(name))? {
                removed += 1;
            }
        }
        remove_staging_leftovers(&dir);

        let browser_dir = dir.join(BROWSER_PROFILE_DIR);
        if browser_dir.is_dir() {
            fs::remove_dir_all(&browser_dir)
                .map_err(|error| SessionError::storage(&browser_dir, error))?;
        }

        if let Err(error) = fs::remove_dir(&dir) {
            debug!(path = %dir.display(), %error, "profile directory left in place");
        }

        if removed == 0 {
            debug!(profile, "no session artifacts to clear");
            Ok(ClearOutcome::NotFound)
        } else {
            info!(profile, removed, "session cleared");
            Ok(ClearOutcome::Removed)
        }
    }

    /// Status of `profile` for presentation.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::load`].
    pub fn describe(&self, profile: &str) -> Result<SessionStatus, SessionError> {
        self.describe_at(profile, Utc::now())
    }

    /// [`SessionStore::describe`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::load`].
    pub fn describe_at(&self, profile: &str, now: DateTime<Utc>) -> Result<SessionStatus, SessionError> {
        Ok(match self.load(profile)? {
            Some(session) => SessionStatus::from_session(&session, now),
            None => SessionStatus::Absent,
        })
    }
}

fn read_artifact(path: &Path) -> Result<Option<Vec<u8>>, SessionError> {
    match fs::read(path) {
        Ok(bytes) => {
            durable::correct_permissions(path, FILE_MODE);
            Ok(Some(bytes))
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(SessionError::storage(path, error)),
    }
}

fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), SessionError> {
    write_durably(path, contents).map_err(|error| SessionError::storage(path, error))
}

fn remove_if_present(path: &Path) -> Result<bool, SessionError> {
    durable::remove_durably(path).map_err(|error| SessionError::storage(path, error))
}

fn remove_staging_leftovers(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if durable::is_staging_leftover(&name.to_string_lossy())
            && let Err(error) = fs::remove_file(entry.path())
        {
            warn!(path = %entry.path().display(), %error, "could not remove staging leftover");
        }
    }
}
