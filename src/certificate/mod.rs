//! Identity bundle validation and metadata extraction.
//!
//! [`CertificateStore`] opens a bundle through one of two backends (a local
//! PKCS#12/PEM/DER file or a hardware token reached through an injected
//! [`TokenRegistry`]), unlocks it, and returns a [`CertificateRecord`].
//! Records outside their validity window are returned with `expired` set
//! rather than rejected.

pub mod hardware_token;
pub mod local_file;
mod pkcs12;
pub mod secret;

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::config::{expand_home, sanitize_env_path};

pub use hardware_token::{
    ExportedCertificateRegistry, HardwareTokenBackend, NoTokenRegistry, TokenCertificate,
    TokenRegistry,
};
pub use local_file::LocalFileBackend;
pub use secret::{KeychainError, Secret, SecretSource, forget_passphrase, remember_passphrase, resolve_passphrase};

pub const CERT_TYPE_ENV: &str = "PJE_CERT_TYPE";
pub const CERT_PATH_ENV: &str = "PJE_CERT_PATH";
pub const CERT_THUMBPRINT_ENV: &str = "PJE_CERT_THUMBPRINT";
pub const TOKEN_DIR_ENV: &str = "PJE_TOKEN_DIR";

/// Days before expiry at which a certificate is reported as expiring soon.
pub const DEFAULT_WARN_DAYS: i64 = 30;

/// Where key material lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Password-protected file (A1).
    LocalFile,
    /// Smart card or USB token (A3).
    HardwareToken,
}

impl Backend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalFile => "local_file",
            Self::HardwareToken => "hardware_token",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = CertificateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a1" | "local_file" | "local-file" => Ok(Self::LocalFile),
            "a3" | "hardware_token" | "hardware-token" => Ok(Self::HardwareToken),
            other => Err(CertificateError::UnknownBackend(other.to_string())),
        }
    }
}

/// Certificate-layer failures. Each variant calls for a different fix.
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    /// The locator does not resolve to a bundle.
    #[error("certificate not found: {locator}")]
    NotFound { locator: String },
    /// The bundle rejected the passphrase.
    #[error("wrong passphrase for certificate bundle {locator}")]
    InvalidSecret { locator: String },
    /// The bundle is not a format this crate can read.
    #[error("unsupported certificate format for {locator}: {reason}")]
    UnsupportedFormat { locator: String, reason: String },
    /// Reading the bundle failed for a reason other than absence.
    #[error("failed to read certificate {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The backend cannot be used in this environment.
    #[error("certificate backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A required environment setting is missing.
    #[error("{0} is not set")]
    MissingSetting(&'static str),
    /// `PJE_CERT_TYPE` names no known backend.
    #[error("unknown certificate type '{0}' (expected A1 or A3)")]
    UnknownBackend(String),
}

impl CertificateError {
    pub(crate) fn unsupported(locator: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            locator: locator.to_string(),
            reason: reason.into(),
        }
    }
}

/// An opened and unlocked bundle, before metadata extraction.
#[derive(Debug, Clone)]
pub struct UnlockedBundle {
    /// DER encoding of the end-entity certificate.
    pub der: Vec<u8>,
    pub has_private_key: bool,
    /// Resolved locator (absolute path or token selector).
    pub locator: String,
}

/// Identity fields read from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMetadata {
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub fingerprint: String,
    pub thumbprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Capabilities every backend provides.
pub trait CertificateBackend {
    fn kind(&self) -> Backend;

    /// Locates the bundle and unlocks it with `secret`.
    ///
    /// # Errors
    ///
    /// [`CertificateError::NotFound`] when the locator does not resolve,
    /// [`CertificateError::InvalidSecret`] when unlocking fails.
    fn unlock(&self, locator: &str, secret: Option<&Secret>) -> Result<UnlockedBundle, CertificateError>;

    /// Reads identity metadata from an unlocked bundle.
    ///
    /// # Errors
    ///
    /// [`CertificateError::UnsupportedFormat`] when the certificate cannot be
    /// decoded.
    fn extract_metadata(&self, bundle: &UnlockedBundle) -> Result<CertificateMetadata, CertificateError> {
        metadata_from_der(&bundle.der).map_err(|reason| CertificateError::unsupported(&bundle.locator, reason))
    }
}

/// Health classification of a record at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateHealth {
    Valid,
    ExpiringSoon,
    Expired,
    NotYetValid,
}

impl CertificateHealth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::ExpiringSoon => "expiring soon",
            Self::Expired => "expired",
            Self::NotYetValid => "not yet valid",
        }
    }

    /// True when the certificate can be used right now.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Valid | Self::ExpiringSoon)
    }
}

impl fmt::Display for CertificateHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated certificate. Constructed per check, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub backend: Backend,
    pub subject: String,
    pub issuer: String,
    /// SHA-256 of the DER certificate, lowercase hex.
    pub fingerprint: String,
    /// SHA-1 of the DER certificate, uppercase hex.
    pub thumbprint: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub has_private_key: bool,
    pub locator: String,
    /// Outside the validity window at `checked_at`.
    pub expired: bool,
    pub days_until_expiry: i64,
    pub checked_at: DateTime<Utc>,
}

impl CertificateRecord {
    fn from_parts(backend: Backend, bundle: UnlockedBundle, meta: CertificateMetadata, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            backend,
            subject: meta.subject,
            issuer: meta.issuer,
            fingerprint: meta.fingerprint,
            thumbprint: meta.thumbprint,
            serial_number: meta.serial_number,
            not_before: meta.not_before,
            not_after: meta.not_after,
            has_private_key: bundle.has_private_key,
            locator: bundle.locator,
            expired: false,
            days_until_expiry: 0,
            checked_at: now,
        };
        record.expired = !record.is_valid_at(now);
        record.days_until_expiry = (record.not_after - now).num_days();
        record
    }

    /// Inclusive on both ends: `not_before <= now <= not_after`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// The flag computed at load time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_valid_at(now)
    }

    /// Health at load time with a `warn_days` expiry warning window.
    #[must_use]
    pub fn validate(&self, warn_days: i64) -> CertificateHealth {
        self.validate_at(warn_days, self.checked_at)
    }

    #[must_use]
    pub fn validate_at(&self, warn_days: i64, now: DateTime<Utc>) -> CertificateHealth {
        if now < self.not_before {
            CertificateHealth::NotYetValid
        } else if now > self.not_after {
            CertificateHealth::Expired
        } else if self.not_after - now <= TimeDelta::days(warn_days.max(0)) {
            CertificateHealth::ExpiringSoon
        } else {
            CertificateHealth::Valid
        }
    }

    /// One-line status using the default warning window.
    #[must_use]
    pub fn summarize(&self) -> String {
        self.summarize_with(DEFAULT_WARN_DAYS)
    }

    #[must_use]
    pub fn summarize_with(&self, warn_days: i64) -> String {
        let not_after = self.not_after.format("%Y-%m-%d");
        match self.validate(warn_days) {
            CertificateHealth::Valid => format!(
                "Certificate valid until {not_after} ({} days left): {}",
                self.days_until_expiry, self.subject
            ),
            CertificateHealth::ExpiringSoon => format!(
                "Certificate expires in {} days ({not_after}): {}",
                self.days_until_expiry, self.subject
            ),
            CertificateHealth::Expired => {
                format!("Certificate expired on {not_after}: {}", self.subject)
            }
            CertificateHealth::NotYetValid => format!(
                "Certificate not valid before {}: {}",
                self.not_before.format("%Y-%m-%d"),
                self.subject
            ),
        }
    }
}

/// Loads bundles through the backend matching each request.
#[derive(Debug)]
pub struct CertificateStore {
    local_file: LocalFileBackend,
    hardware_token: HardwareTokenBackend,
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new(Box::new(NoTokenRegistry))
    }
}

impl CertificateStore {
    /// Store whose hardware-token backend uses `registry`.
    #[must_use]
    pub fn new(registry: Box<dyn TokenRegistry>) -> Self {
        Self {
            local_file: LocalFileBackend,
            hardware_token: HardwareTokenBackend::new(registry),
        }
    }

    fn backend(&self, backend: Backend) -> &dyn CertificateBackend {
        match backend {
            Backend::LocalFile => &self.local_file,
            Backend::HardwareToken => &self.hardware_token,
        }
    }

    /// Opens, unlocks and inspects a bundle.
    ///
    /// # Errors
    ///
    /// See [`CertificateError`]; an expired certificate is not an error.
    pub fn load(
        &self,
        backend: Backend,
        locator: &str,
        secret: Option<&Secret>,
    ) -> Result<CertificateRecord, CertificateError> {
        self.load_at(backend, locator, secret, Utc::now())
    }

    /// [`CertificateStore::load`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`CertificateStore::load`].
    #[instrument(level = "debug", skip(self, secret))]
    pub fn load_at(
        &self,
        backend: Backend,
        locator: &str,
        secret: Option<&Secret>,
        now: DateTime<Utc>,
    ) -> Result<CertificateRecord, CertificateError> {
        let implementation = self.backend(backend);
        let bundle = implementation.unlock(locator, secret)?;
        let meta = implementation.extract_metadata(&bundle)?;
        let record = CertificateRecord::from_parts(backend, bundle, meta, now);

        if record.expired {
            warn!(
                %backend,
                subject = %record.subject,
                not_after = %record.not_after,
                "certificate is outside its validity window"
            );
        } else {
            info!(
                %backend,
                subject = %record.subject,
                days_until_expiry = record.days_until_expiry,
                "certificate loaded"
            );
        }
        Ok(record)
    }

    /// Pure expiry check.
    #[must_use]
    pub fn is_expired(record: &CertificateRecord) -> bool {
        record.is_expired()
    }

    /// Pure one-line summary.
    #[must_use]
    pub fn summarize(record: &CertificateRecord) -> String {
        record.summarize()
    }
}

/// Which certificate to load, as configured by the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSource {
    pub backend: Backend,
    /// File path for local bundles, thumbprint selector (possibly empty) for
    /// tokens.
    pub locator: String,
    pub token_dir: Option<PathBuf>,
}

impl CertificateSource {
    /// Reads `PJE_CERT_TYPE`, `PJE_CERT_PATH`, `PJE_CERT_THUMBPRINT` and
    /// `PJE_TOKEN_DIR`.
    ///
    /// # Errors
    ///
    /// [`CertificateError::UnknownBackend`] for an unrecognized type and
    /// [`CertificateError::MissingSetting`] when a local bundle has no path.
    pub fn from_env() -> Result<Self, CertificateError> {
        let backend = match env::var(CERT_TYPE_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => Backend::LocalFile,
        };
        let token_dir = sanitize_env_path(env::var_os(TOKEN_DIR_ENV));

        let locator = match backend {
            Backend::LocalFile => env::var(CERT_PATH_ENV)
                .ok()
                .filter(|path| !path.trim().is_empty())
                .ok_or(CertificateError::MissingSetting(CERT_PATH_ENV))?,
            Backend::HardwareToken => env::var(CERT_THUMBPRINT_ENV).unwrap_or_default(),
        };

        Ok(Self {
            backend,
            locator,
            token_dir,
        })
    }

    /// Store wired with the token registry this source calls for.
    #[must_use]
    pub fn store(&self) -> CertificateStore {
        match &self.token_dir {
            Some(dir) => CertificateStore::new(Box::new(ExportedCertificateRegistry::new(expand_home(
                &dir.to_string_lossy(),
            )))),
            None => CertificateStore::default(),
        }
    }
}

/// Loads the certificate configured by the environment, resolving the
/// passphrase from `PJE_CERT_PASSWORD` or the keychain.
///
/// # Errors
///
/// See [`CertificateSource::from_env`] and [`CertificateStore::load`].
pub fn load_from_env() -> Result<CertificateRecord, CertificateError> {
    let source = CertificateSource::from_env()?;
    let secret = resolve_passphrase().map(|(secret, _)| secret);
    source
        .store()
        .load(source.backend, &source.locator, secret.as_ref())
}

/// Decodes a DER certificate into [`CertificateMetadata`].
pub(crate) fn metadata_from_der(der: &[u8]) -> Result<CertificateMetadata, String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|error| format!("not an X.509 certificate: {error}"))?;
    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(|| "notBefore is out of range".to_string())?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| "notAfter is out of range".to_string())?;

    Ok(CertificateMetadata {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: hex_encode_upper(cert.raw_serial()),
        fingerprint: hex_encode(&Sha256::digest(der)),
        thumbprint: thumbprint(der),
        not_before,
        not_after,
    })
}

/// Uppercase SHA-1 hex of a DER certificate.
pub(crate) fn thumbprint(der: &[u8]) -> String {
    hex_encode_upper(&Sha1::digest(der))
}

/// Normalizes a user-supplied thumbprint (drops separators, uppercases).
#[must_use]
pub fn normalize_thumbprint(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

fn hex_encode_upper(bytes: &[u8]) -> String {
    hex_encode(bytes).to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(not_before: DateTime<Utc>, not_after: DateTime<Utc>, now: DateTime<Utc>) -> CertificateRecord {
        let bundle = UnlockedBundle {
            der: Vec::new(),
            has_private_key: true,
            locator: "/tmp/cert.pfx".to_string(),
        };
        let meta = CertificateMetadata {
            subject: "CN=MARIA DA SILVA:12345678900".to_string(),
            issuer: "CN=AC Teste".to_string(),
            serial_number: "01".to_string(),
            fingerprint: "ab".to_string(),
            thumbprint: "CD".to_string(),
            not_before,
            not_after,
        };
        CertificateRecord::from_parts(Backend::LocalFile, bundle, meta, now)
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let now = Utc::now();
        let rec = record(now - TimeDelta::days(1), now, now);
        assert!(rec.is_valid_at(now));
        assert!(!rec.is_expired());
        assert!(rec.is_expired_at(now + TimeDelta::seconds(1)));

        let starts_now = record(now, now + TimeDelta::days(1), now);
        assert!(starts_now.is_valid_at(now));
    }

    #[test]
    fn test_expired_record_flags_and_health() {
        let now = Utc::now();
        let rec = record(now - TimeDelta::days(10), now - TimeDelta::seconds(1), now);
        assert!(rec.is_expired());
        assert!(CertificateStore::is_expired(&rec));
        assert_eq!(rec.validate(DEFAULT_WARN_DAYS), CertificateHealth::Expired);
        assert!(rec.summarize().starts_with("Certificate expired on"));
    }

    #[test]
    fn test_expiring_soon_inside_warning_window() {
        let now = Utc::now();
        let rec = record(now - TimeDelta::days(300), now + TimeDelta::days(10), now);
        assert_eq!(rec.validate(30), CertificateHealth::ExpiringSoon);
        assert_eq!(rec.validate(5), CertificateHealth::Valid);
        assert_eq!(rec.days_until_expiry, 10);
        assert!(rec.summarize().contains("expires in 10 days"));
    }

    #[test]
    fn test_not_yet_valid_is_flagged_expired() {
        let now = Utc::now();
        let rec = record(now + TimeDelta::days(1), now + TimeDelta::days(400), now);
        assert!(rec.is_expired());
        assert_eq!(rec.validate(30), CertificateHealth::NotYetValid);
        assert!(!rec.validate(30).is_usable());
    }

    #[test]
    fn test_backend_parsing_accepts_original_labels() {
        assert_eq!("A1".parse::<Backend>().unwrap(), Backend::LocalFile);
        assert_eq!("a3".parse::<Backend>().unwrap(), Backend::HardwareToken);
        assert_eq!("local-file".parse::<Backend>().unwrap(), Backend::LocalFile);
        assert!(matches!(
            "A2".parse::<Backend>(),
            Err(CertificateError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_normalize_thumbprint_strips_separators() {
        assert_eq!(normalize_thumbprint("2f:d0 a2-16"), "2FD0A216");
    }

    #[test]
    fn test_hex_encode_upper() {
        assert_eq!(hex_encode_upper(&[0x0c, 0xd3, 0xff]), "0CD3FF");
        assert_eq!(hex_encode(&[0x0c, 0xd3, 0xff]), "0cd3ff");
    }

    #[test]
    fn test_metadata_from_der_rejects_garbage() {
        assert!(metadata_from_der(b"definitely not der").is_err());
    }
}
