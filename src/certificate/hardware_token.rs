//! Token-backed certificates (A3).
//!
//! The key never leaves the token; this backend only needs the certificate
//! itself. How a certificate is located on a given platform is injected as a
//! [`TokenRegistry`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{
    Backend, CertificateBackend, CertificateError, Secret, UnlockedBundle, normalize_thumbprint,
    thumbprint,
};

/// A certificate returned by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCertificate {
    pub der: Vec<u8>,
    /// Whether the registry can reach the matching private key.
    pub has_private_key: bool,
    /// Human-readable origin (file name, slot label).
    pub label: String,
}

/// Platform capability for finding certificates held by a token.
pub trait TokenRegistry: fmt::Debug + Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Finds the certificate whose SHA-1 thumbprint matches `thumbprint`, or
    /// the first available one when `thumbprint` is `None`.
    ///
    /// # Errors
    ///
    /// [`CertificateError::NotFound`] when nothing matches,
    /// [`CertificateError::BackendUnavailable`] when the registry cannot be
    /// queried, [`CertificateError::InvalidSecret`] when a PIN is rejected.
    fn find(&self, thumbprint: Option<&str>, pin: Option<&Secret>) -> Result<TokenCertificate, CertificateError>;
}

/// Registry for environments without token support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokenRegistry;

impl TokenRegistry for NoTokenRegistry {
    fn name(&self) -> &str {
        "none"
    }

    fn find(&self, _thumbprint: Option<&str>, _pin: Option<&Secret>) -> Result<TokenCertificate, CertificateError> {
        Err(CertificateError::BackendUnavailable(
            "no hardware token registry configured (set PJE_TOKEN_DIR to a directory of exported certificates)"
                .to_string(),
        ))
    }
}

/// Registry over a directory of certificates exported from the token
/// (`.cer`, `.crt`, `.der`, `.pem`). Files are scanned in name order.
#[derive(Debug, Clone)]
pub struct ExportedCertificateRegistry {
    dir: PathBuf,
}

impl ExportedCertificateRegistry {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self) -> Result<Vec<PathBuf>, CertificateError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(CertificateError::BackendUnavailable(format!(
                    "token directory {} does not exist",
                    self.dir.display()
                )));
            }
            Err(source) => {
                return Err(CertificateError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| {
                        matches!(
                            ext.to_string_lossy().to_ascii_lowercase().as_str(),
                            "cer" | "crt" | "der" | "pem"
                        )
                    })
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl TokenRegistry for ExportedCertificateRegistry {
    fn name(&self) -> &str {
        "exported-certificates"
    }

    fn find(&self, wanted: Option<&str>, _pin: Option<&Secret>) -> Result<TokenCertificate, CertificateError> {
        let wanted = wanted.map(normalize_thumbprint).filter(|value| !value.is_empty());

        for path in self.candidates()? {
            let label = path.display().to_string();
            let der = match fs::read(&path) {
                Ok(bytes) => match super::local_file::certificate_der(&bytes, &label) {
                    Ok(der) => der,
                    Err(error) => {
                        warn!(path = %label, %error, "skipping unreadable exported certificate");
                        continue;
                    }
                },
                Err(error) => {
                    warn!(path = %label, %error, "skipping unreadable exported certificate");
                    continue;
                }
            };

            let found = thumbprint(&der);
            if wanted.as_deref().is_none_or(|wanted| wanted == found) {
                debug!(path = %label, thumbprint = %found, "token certificate selected");
                return Ok(TokenCertificate {
                    der,
                    has_private_key: false,
                    label,
                });
            }
        }

        Err(CertificateError::NotFound {
            locator: match wanted {
                Some(thumbprint) => format!("thumbprint {thumbprint} in {}", self.dir.display()),
                None => format!("any certificate in {}", self.dir.display()),
            },
        })
    }
}

/// Hardware-token backend. The locator is a thumbprint selector; an empty
/// locator picks the first certificate the registry offers.
#[derive(Debug)]
pub struct HardwareTokenBackend {
    registry: Box<dyn TokenRegistry>,
}

impl HardwareTokenBackend {
    #[must_use]
    pub fn new(registry: Box<dyn TokenRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry_name(&self) -> &str {
        self.registry.name()
    }
}

impl CertificateBackend for HardwareTokenBackend {
    fn kind(&self) -> Backend {
        Backend::HardwareToken
    }

    fn unlock(&self, locator: &str, secret: Option<&Secret>) -> Result<UnlockedBundle, CertificateError> {
        let selector = Some(locator.trim()).filter(|value| !value.is_empty());
        debug!(registry = self.registry.name(), ?selector, "querying token registry");
        let found = self.registry.find(selector, secret)?;
        Ok(UnlockedBundle {
            der: found.der,
            has_private_key: found.has_private_key,
            locator: found.label,
        })
    }
}
