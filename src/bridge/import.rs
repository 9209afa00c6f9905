//! Registering an externally captured login from a browser storage-state
//! export (`{"cookies": [...], "origins": [...]}`).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::session::SessionCookie;

/// Errors while reading a storage-state export.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("storage state is empty")]
    EmptyInput,
    #[error("invalid storage state JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no valid cookies found after validation")]
    NoValidCookies,
}

/// Cookies split out of an export, plus the export itself as the opaque
/// storage state.
#[derive(Debug, Clone)]
pub struct ImportedState {
    pub cookies: Vec<SessionCookie>,
    pub storage_state: Vec<u8>,
    /// Non-fatal problems (skipped entries).
    pub warnings: Vec<String>,
}

/// Parses a storage-state export. Invalid or expired cookies are skipped
/// with a warning; the export bytes are kept unchanged as the state blob.
///
/// # Errors
///
/// [`ImportError::EmptyInput`] for blank input, [`ImportError::Json`] when
/// the input is not a storage-state object, and
/// [`ImportError::NoValidCookies`] when every cookie was rejected.
pub fn import_storage_state(input: &[u8]) -> Result<ImportedState, ImportError> {
    import_storage_state_at(input, Utc::now())
}

/// [`import_storage_state`] judging cookie expiry against `now`.
///
/// # Errors
///
/// Same as [`import_storage_state`].
#[instrument(level = "debug", skip(input))]
pub fn import_storage_state_at(input: &[u8], now: DateTime<Utc>) -> Result<ImportedState, ImportError> {
    if input.trim_ascii().is_empty() {
        return Err(ImportError::EmptyInput);
    }

    let export: StorageStateExport = serde_json::from_slice(input)?;
    let now = now.timestamp();
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();

    for (index, entry) in export.cookies.into_iter().enumerate() {
        match convert_cookie(entry, now) {
            Ok(cookie) => cookies.push(cookie),
            Err(reason) => warnings.push(format!("entry {}: {reason}", index + 1)),
        }
    }

    if cookies.is_empty() {
        return Err(ImportError::NoValidCookies);
    }

    Ok(ImportedState {
        cookies,
        storage_state: input.to_vec(),
        warnings,
    })
}

fn convert_cookie(entry: ExportedCookie, now: i64) -> Result<SessionCookie, String> {
    let domain = entry.domain.unwrap_or_default().trim().to_string();
    if domain.is_empty() {
        return Err("missing required field: domain".to_string());
    }

    let name = entry.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err("missing required field: name".to_string());
    }

    let value = entry.value.unwrap_or_default();
    if value.is_empty() {
        return Err(format!("cookie '{name}' for domain '{domain}' has empty value"));
    }

    let expires = entry.expires.and_then(normalized_expiry);
    if expires.is_some_and(|expires| expires <= now) {
        return Err(format!("skipped expired cookie '{name}' for domain '{domain}'"));
    }

    let mut cookie = SessionCookie::new(name, value, domain);
    let path = entry.path.unwrap_or_default();
    if !path.trim().is_empty() {
        cookie = cookie.with_path(if path.starts_with('/') { path } else { format!("/{path}") });
    }
    cookie.expires = expires;
    cookie.http_only = entry.http_only.unwrap_or(false);
    cookie.secure = entry.secure.unwrap_or(false);
    cookie.same_site = entry.same_site;
    Ok(cookie)
}

/// `-1` and other non-positive values mark a session cookie.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn normalized_expiry(raw: f64) -> Option<i64> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let floored = raw.floor();
    if floored >= i64::MAX as f64 {
        return Some(i64::MAX);
    }
    Some(floored as i64)
}

#[derive(Debug, Deserialize)]
struct StorageStateExport {
    #[serde(default)]
    cookies: Vec<ExportedCookie>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedCookie {
    name: Option<String>,
    value: Option<String>,
    domain: Option<String>,
    path: Option<String>,
    expires: Option<f64>,
    http_only: Option<bool>,
    secure: Option<bool>,
    same_site: Option<String>,
}
