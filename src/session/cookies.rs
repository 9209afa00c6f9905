//! Cookie records persisted in `cookies.json`.
//!
//! The on-disk shape follows the browser-automation layer's cookie objects
//! (`name`, `value`, `domain`, `path`, `expires`, `httpOnly`, `secure`,
//! `sameSite`) so a seeded context can receive them without translation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cookie belonging to an authenticated session.
///
/// The value is redacted in `Debug` output so a session can be logged
/// without leaking credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    value: String,
    /// Domain the cookie belongs to (e.g. `.tjes.jus.br`).
    pub domain: String,
    /// URL path scope.
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix timestamp (seconds) of expiry; `None` for a session cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl SessionCookie {
    /// Creates a session cookie scoped to `/` with no expiry.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expires: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    /// Sets the expiry timestamp.
    #[must_use]
    pub fn with_expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Sets the path scope.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Marks the cookie `Secure` and `HttpOnly`.
    #[must_use]
    pub fn hardened(mut self) -> Self {
        self.secure = true;
        self.http_only = true;
        self
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; never log the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True when the cookie carries an expiry at or before `now` (unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("same_site", &self.same_site)
            .finish()
    }
}

/// Counts distinct cookie domains, ignoring a leading dot.
#[must_use]
pub fn unique_domain_count(cookies: &[SessionCookie]) -> usize {
    cookies
        .iter()
        .map(|cookie| cookie.domain.trim_start_matches('.'))
        .collect::<HashSet<_>>()
        .len()
}
