//! Bundle passphrases: redacted holder and resolution from the environment
//! or the OS keychain.

use std::env;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

/// Passphrase environment variable.
pub const PASSWORD_ENV: &str = "PJE_CERT_PASSWORD";

const KEYRING_SERVICE: &str = "pje-auth";
const KEYRING_ENTRY_NAME: &str = "certificate-passphrase";

/// A passphrase or PIN. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw secret. Never log the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a resolved passphrase came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    Keychain,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => f.write_str(PASSWORD_ENV),
            Self::Keychain => f.write_str("system keychain"),
        }
    }
}

/// Keychain access failed.
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("unable to access the system keychain for the certificate passphrase")]
    Unavailable,
}

/// Resolves the bundle passphrase: `PJE_CERT_PASSWORD` first, then the
/// keychain entry written by [`remember_passphrase`].
#[must_use]
pub fn resolve_passphrase() -> Option<(Secret, SecretSource)> {
    if let Some(secret) = passphrase_from_env() {
        debug!(source = %SecretSource::Environment, "certificate passphrase resolved");
        return Some((secret, SecretSource::Environment));
    }
    let secret = passphrase_from_keychain()?;
    debug!(source = %SecretSource::Keychain, "certificate passphrase resolved");
    Some((secret, SecretSource::Keychain))
}

/// Reads `PJE_CERT_PASSWORD`. Unset or empty yields `None`.
#[must_use]
pub fn passphrase_from_env() -> Option<Secret> {
    env::var(PASSWORD_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Secret::from)
}

/// Reads the stored keychain passphrase. Any keychain failure yields `None`.
#[must_use]
pub fn passphrase_from_keychain() -> Option<Secret> {
    let entry = safe_keyring_entry().ok()?;
    match catch_unwind(AssertUnwindSafe(|| entry.get_password())) {
        Ok(Ok(password)) if !password.is_empty() => Some(Secret::from(password)),
        Ok(Ok(_) | Err(keyring::Error::NoEntry)) => None,
        Ok(Err(error)) => {
            warn!(%error, "keychain lookup failed; continuing without stored passphrase");
            None
        }
        Err(_) => {
            warn!("keychain backend panicked; continuing without stored passphrase");
            None
        }
    }
}

/// Stores `secret` in the OS keychain.
///
/// # Errors
///
/// Returns [`KeychainError::Unavailable`] when the keychain cannot be used.
pub fn remember_passphrase(secret: &Secret) -> Result<(), KeychainError> {
    let entry = safe_keyring_entry()?;
    catch_unwind(AssertUnwindSafe(|| entry.set_password(secret.expose())))
        .map_err(|_| KeychainError::Unavailable)?
        .map_err(|_| KeychainError::Unavailable)
}

/// Deletes the keychain passphrase. Returns `false` when none was stored.
///
/// # Errors
///
/// Returns [`KeychainError::Unavailable`] when the keychain cannot be used.
pub fn forget_passphrase() -> Result<bool, KeychainError> {
    let entry = safe_keyring_entry()?;
    match catch_unwind(AssertUnwindSafe(|| entry.delete_credential())) {
        Ok(Ok(())) => Ok(true),
        Ok(Err(keyring::Error::NoEntry)) => Ok(false),
        Ok(Err(_)) | Err(_) => Err(KeychainError::Unavailable),
    }
}

fn safe_keyring_entry() -> Result<keyring::Entry, KeychainError> {
    catch_unwind(|| keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY_NAME))
        .map_err(|_| KeychainError::Unavailable)?
        .map_err(|_| KeychainError::Unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let secret = Secret::new("correct-horse");
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("correct-horse"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_expose_returns_value() {
        let secret = Secret::from("pin");
        assert_eq!(secret.expose(), "pin");
        assert!(!secret.is_empty());
        assert!(Secret::new("").is_empty());
    }

    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    #[test]
    fn test_keychain_entry_uses_platform_store() {
        let entry = safe_keyring_entry().unwrap();
        let credential = entry.get_credential();
        assert!(credential.downcast_ref::<keyring::mock::MockCredential>().is_none());
    }

    #[test]
    fn test_source_display_names_origin() {
        assert_eq!(SecretSource::Environment.to_string(), "PJE_CERT_PASSWORD");
        assert_eq!(SecretSource::Keychain.to_string(), "system keychain");
    }
}
