//! Hand-off between the session store and the browser-automation layer.
//!
//! This crate never drives a browser. [`AutomationBridge`] turns a stored
//! session into [`BrowserInitParams`] for the driver, and persists whatever
//! the driver reports after a completed login.

mod import;

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument};

use crate::config::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, RuntimeSettings};
use crate::session::{
    AuthMethod, BROWSER_PROFILE_DIR, STATE_FILE, Session, SessionCookie, SessionError,
    SessionLookup, SessionStore,
};

pub use import::{ImportError, ImportedState, import_storage_state, import_storage_state_at};

/// Viewport size for the persistent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Options for the persistent browser context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserContextOptions {
    pub accept_downloads: bool,
    pub ignore_https_errors: bool,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone_id: String,
}

impl Default for BrowserContextOptions {
    fn default() -> Self {
        Self {
            accept_downloads: true,
            ignore_https_errors: false,
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            locale: "pt-BR".to_string(),
            timezone_id: "America/Sao_Paulo".to_string(),
        }
    }
}

/// Everything the driver needs to open a browser context for a profile.
///
/// Serializes to camelCase JSON for an out-of-process driver. The storage
/// state travels by path (`storageStatePath`); the in-memory copy is not
/// serialized.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInitParams {
    pub profile_name: String,
    /// Persistent browser profile directory.
    pub user_data_dir: PathBuf,
    /// `None` for a fresh login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_state_path: Option<PathBuf>,
    pub cookies: Vec<SessionCookie>,
    #[serde(skip)]
    pub storage_state: Option<Vec<u8>>,
    pub context: BrowserContextOptions,
    pub timeout_seconds: i64,
    pub retry_attempts: i64,
}

impl BrowserInitParams {
    /// True when the params carry a stored session.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        self.storage_state.is_some()
    }
}

impl fmt::Debug for BrowserInitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserInitParams")
            .field("profile_name", &self.profile_name)
            .field("user_data_dir", &self.user_data_dir)
            .field("storage_state_path", &self.storage_state_path)
            .field("cookies", &self.cookies)
            .field("storage_state_bytes", &self.storage_state.as_ref().map(Vec::len))
            .field("context", &self.context)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

/// What the driver hands back after a completed login.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedArtifacts {
    pub cookies: Vec<SessionCookie>,
    pub storage_state: Vec<u8>,
}

/// Error type drivers return.
pub type DriverError = Box<dyn StdError + Send + Sync>;

/// The browser-automation collaborator.
pub trait BrowserAutomation {
    /// Runs the interactive login for `method` in a context built from
    /// `params` and returns the resulting artifacts.
    ///
    /// # Errors
    ///
    /// Any driver failure; the login is treated as not completed.
    fn authenticate(
        &mut self,
        params: &BrowserInitParams,
        method: AuthMethod,
    ) -> Result<AuthenticatedArtifacts, DriverError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("browser automation failed: {0}")]
    Automation(#[source] DriverError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Result of [`AutomationBridge::ensure_authenticated`].
#[derive(Debug, Clone)]
pub struct EnsuredSession {
    pub session: Session,
    pub params: BrowserInitParams,
    /// True when a stored session was reused without logging in.
    pub reused: bool,
}

/// Connects [`SessionStore`] to a [`BrowserAutomation`] driver.
#[derive(Debug, Clone)]
pub struct AutomationBridge {
    store: SessionStore,
    context: BrowserContextOptions,
    timeout_seconds: i64,
    retry_attempts: i64,
}

impl AutomationBridge {
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            context: BrowserContextOptions::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Bridge using the resolved timeout and retry settings.
    #[must_use]
    pub fn from_settings(store: SessionStore, settings: &RuntimeSettings) -> Self {
        Self::new(store).with_limits(settings.timeout_seconds.value, settings.retry_attempts.value)
    }

    #[must_use]
    pub fn with_limits(mut self, timeout_seconds: i64, retry_attempts: i64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self.retry_attempts = retry_attempts;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: BrowserContextOptions) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Init params that restore `session` in the browser.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidProfile`] when the session's profile name is
    /// malformed.
    pub fn seed(&self, session: &Session) -> Result<BrowserInitParams, BridgeError> {
        let dir = self.store.profile_dir(&session.profile_name)?;
        Ok(BrowserInitParams {
            profile_name: session.profile_name.clone(),
            user_data_dir: dir.join(BROWSER_PROFILE_DIR),
            storage_state_path: Some(dir.join(STATE_FILE)),
            cookies: session.cookies.clone(),
            storage_state: Some(session.storage_state.clone()),
            context: self.context.clone(),
            timeout_seconds: self.timeout_seconds,
            retry_attempts: self.retry_attempts,
        })
    }

    /// Records a reuse of `session` and returns it as now stored, with the
    /// refreshed `last_used_at`.
    ///
    /// # Errors
    ///
    /// Any [`SessionError`] from touching or re-reading the session.
    pub fn mark_used(&self, session: Session) -> Result<Session, BridgeError> {
        let profile = session.profile_name.clone();
        self.store.touch(&profile)?;
        Ok(self.store.load(&profile)?.unwrap_or(session))
    }

    /// Init params for a first-time login of `profile`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidProfile`] for malformed names.
    pub fn fresh_params(&self, profile: &str) -> Result<BrowserInitParams, BridgeError> {
        let dir = self.store.profile_dir(profile)?;
        Ok(BrowserInitParams {
            profile_name: profile.to_string(),
            user_data_dir: dir.join(BROWSER_PROFILE_DIR),
            storage_state_path: None,
            cookies: Vec::new(),
            storage_state: None,
            context: self.context.clone(),
            timeout_seconds: self.timeout_seconds,
            retry_attempts: self.retry_attempts,
        })
    }

    /// Called by the driver once a login completes; persists the artifacts.
    ///
    /// # Errors
    ///
    /// Any [`SessionError`] from [`SessionStore::save`].
    #[instrument(level = "debug", skip(self, cookies, storage_state))]
    pub fn on_authenticated(
        &self,
        profile: &str,
        auth_method: AuthMethod,
        cookies: Vec<SessionCookie>,
        storage_state: Vec<u8>,
    ) -> Result<Session, BridgeError> {
        Ok(self.store.save(profile, auth_method, cookies, storage_state)?)
    }

    /// Registers a storage-state export as `profile`'s session.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Import`] when the export has no usable cookies, and any
    /// [`SessionError`] from saving.
    pub fn import(
        &self,
        profile: &str,
        auth_method: AuthMethod,
        export: &[u8],
    ) -> Result<(Session, Vec<String>), BridgeError> {
        let imported = import_storage_state(export)?;
        let session = self.on_authenticated(profile, auth_method, imported.cookies, imported.storage_state)?;
        Ok((session, imported.warnings))
    }

    /// Reuses a valid stored session, or runs `driver` to log in and stores
    /// the result.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Automation`] when the driver fails, otherwise any
    /// [`SessionError`].
    pub fn ensure_authenticated(
        &self,
        profile: &str,
        auth_method: AuthMethod,
        driver: &mut dyn BrowserAutomation,
    ) -> Result<EnsuredSession, BridgeError> {
        match self.store.lookup(profile)? {
            SessionLookup::Valid(session) => {
                let session = self.mark_used(session)?;
                let params = self.seed(&session)?;
                info!(profile, "reusing stored session");
                return Ok(EnsuredSession {
                    session,
                    params,
                    reused: true,
                });
            }
            SessionLookup::Expired(_) => info!(profile, "stored session expired; authenticating again"),
            SessionLookup::NotFound => info!(profile, "no stored session; authenticating"),
        }

        let fresh = self.fresh_params(profile)?;
        let artifacts = driver
            .authenticate(&fresh, auth_method)
            .map_err(BridgeError::Automation)?;
        let session = self.on_authenticated(profile, auth_method, artifacts.cookies, artifacts.storage_state)?;
        let params = self.seed(&session)?;

        Ok(EnsuredSession {
            session,
            params,
            reused: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::session::SessionStoreConfig;

    fn bridge(tempdir: &TempDir) -> AutomationBridge {
        AutomationBridge::new(SessionStore::new(SessionStoreConfig::new(tempdir.path())))
    }

    #[test]
    fn test_default_context_matches_portal_locale() {
        let context = BrowserContextOptions::default();
        assert!(context.accept_downloads);
        assert!(!context.ignore_https_errors);
        assert_eq!(context.viewport, Viewport { width: 1920, height: 1080 });
        assert_eq!(context.locale, "pt-BR");
        assert_eq!(context.timezone_id, "America/Sao_Paulo");
    }

    #[test]
    fn test_fresh_params_point_into_profile_dir() {
        let tempdir = TempDir::new().unwrap();
        let params = bridge(&tempdir).fresh_params("default").unwrap();

        assert_eq!(params.user_data_dir, tempdir.path().join("default").join("browser"));
        assert!(params.storage_state_path.is_none());
        assert!(!params.is_seeded());
        assert_eq!(params.timeout_seconds, 60);
        assert_eq!(params.retry_attempts, 3);
    }

    #[test]
    fn test_seed_serializes_camel_case_without_inline_state() {
        let tempdir = TempDir::new().unwrap();
        let bridge = bridge(&tempdir).with_limits(120, 5);
        let session = bridge
            .on_authenticated(
                "default",
                AuthMethod::CloudIdentity,
                vec![SessionCookie::new("sid", "v", "pje.tjes.jus.br")],
                br#"{"cookies":[],"origins":[]}"#.to_vec(),
            )
            .unwrap();

        let params = bridge.seed(&session).unwrap();
        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json["profileName"], "default");
        assert_eq!(json["timeoutSeconds"], 120);
        assert_eq!(json["context"]["timezoneId"], "America/Sao_Paulo");
        assert!(json["storageStatePath"].as_str().unwrap().ends_with("state.json"));
        assert!(json.get("storageState").is_none());
        assert_eq!(json["cookies"][0]["name"], "sid");
    }

    #[test]
    fn test_debug_hides_state_and_cookie_values() {
        let tempdir = TempDir::new().unwrap();
        let bridge = bridge(&tempdir);
        let session = bridge
            .on_authenticated(
                "default",
                AuthMethod::Certificate,
                vec![SessionCookie::new("sid", "cookie-secret", "pje.tjes.jus.br")],
                br#"{"token":"state-secret"}"#.to_vec(),
            )
            .unwrap();

        let rendered = format!("{:?}", bridge.seed(&session).unwrap());
        assert!(!rendered.contains("cookie-secret"));
        assert!(!rendered.contains("state-secret"));
    }
}
