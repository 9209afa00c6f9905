//! File-backed bundles (A1): PKCS#12 with a passphrase, or a bare PEM/DER
//! certificate.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::{Backend, CertificateBackend, CertificateError, Secret, UnlockedBundle, pkcs12};
use crate::config::expand_home;

const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Pkcs12,
    /// PEM or DER, sniffed from content.
    Certificate,
}

impl FileFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match extension.as_str() {
            "pfx" | "p12" => Some(Self::Pkcs12),
            "pem" | "crt" | "cer" | "der" => Some(Self::Certificate),
            _ => None,
        }
    }
}

/// Local file backend. The locator is a path; `~` is expanded.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileBackend;

impl CertificateBackend for LocalFileBackend {
    fn kind(&self) -> Backend {
        Backend::LocalFile
    }

    fn unlock(&self, locator: &str, secret: Option<&Secret>) -> Result<UnlockedBundle, CertificateError> {
        let path = expand_home(locator.trim());
        let locator_text = path.display().to_string();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(CertificateError::NotFound { locator: locator_text });
            }
            Err(source) => return Err(CertificateError::Io { path, source }),
        };

        let Some(format) = FileFormat::from_path(&path) else {
            return Err(CertificateError::unsupported(
                &locator_text,
                "expected .pfx, .p12, .pem, .crt, .cer or .der",
            ));
        };
        debug!(path = %locator_text, ?format, "opening certificate file");

        match format {
            FileFormat::Pkcs12 => unlock_pkcs12(&bytes, secret, locator_text),
            FileFormat::Certificate => Ok(UnlockedBundle {
                der: certificate_der(&bytes, &locator_text)?,
                has_private_key: false,
                locator: locator_text,
            }),
        }
    }
}

fn unlock_pkcs12(bytes: &[u8], secret: Option<&Secret>, locator: String) -> Result<UnlockedBundle, CertificateError> {
    let password = secret.map_or("", Secret::expose);
    let contents = pkcs12::open(bytes, password, &locator)?;

    let der = select_end_entity(contents.certificates)
        .ok_or_else(|| CertificateError::unsupported(&locator, "bundle holds no certificate"))?;

    Ok(UnlockedBundle {
        der,
        has_private_key: contents.has_private_key,
        locator,
    })
}

/// Prefers the first certificate that is not a CA.
fn select_end_entity(certificates: Vec<Vec<u8>>) -> Option<Vec<u8>> {
    let end_entity = certificates.iter().position(|der| {
        x509_parser::parse_x509_certificate(der).is_ok_and(|(_, cert)| !cert.tbs_certificate.is_ca())
    });
    let index = end_entity.unwrap_or(0);
    certificates.into_iter().nth(index)
}

pub(super) fn certificate_der(bytes: &[u8], locator: &str) -> Result<Vec<u8>, CertificateError> {
    let trimmed = bytes.trim_ascii_start();
    if trimmed.starts_with(b"-----BEGIN") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(trimmed)
            .map_err(|error| CertificateError::unsupported(locator, format!("invalid PEM: {error}")))?;
        if pem.label != PEM_CERTIFICATE_LABEL {
            return Err(CertificateError::unsupported(
                locator,
                format!("PEM block is '{}', expected CERTIFICATE", pem.label),
            ));
        }
        return Ok(pem.contents);
    }
    Ok(bytes.to_vec())
}
