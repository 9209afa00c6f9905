//! Session and certificate fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use pje_auth_core::{SessionCookie, SessionStore, SessionStoreConfig};
use tempfile::TempDir;

/// Storage state shaped like a browser export.
pub const SAMPLE_STATE: &[u8] =
    br#"{"cookies":[],"origins":[{"origin":"https://pje.tjes.jus.br","localStorage":[{"name":"k","value":"v"}]}]}"#;

/// Passphrase of the PKCS#12 fixtures.
pub const FIXTURE_PASSPHRASE: &str = "correct-horse";

/// SHA-1 thumbprint of `valid.*`.
pub const VALID_THUMBPRINT: &str = "2FD0A21674FAAA4AD4468415045F61C1C892E46D";

/// SHA-1 thumbprint of `expired.*`.
pub const EXPIRED_THUMBPRINT: &str = "34835AD041B3CE4F9C612136C77AA95671343E23";

/// Creates a store rooted in a fresh temporary directory.
///
/// The `TempDir` must be kept alive for the store's root to remain valid.
pub fn temp_store() -> (TempDir, SessionStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = SessionStore::new(SessionStoreConfig::new(temp_dir.path()));
    (temp_dir, store)
}

pub fn sample_cookies() -> Vec<SessionCookie> {
    vec![
        SessionCookie::new("JSESSIONID", "node01abc", "pje.tjes.jus.br")
            .with_path("/pje")
            .hardened(),
        SessionCookie::new("KEYCLOAK_SESSION", "realm/abc", ".cloud.pje.jus.br")
            .with_expires(4_102_444_800),
    ]
}

/// Path of one artifact of `profile` under `root`.
pub fn artifact(root: &Path, profile: &str, file: &str) -> PathBuf {
    root.join(profile).join(file)
}

/// Absolute path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A point in time inside the validity window of `valid.*`.
pub fn inside_valid_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Copies a fixture into `dir` under `name`.
pub fn copy_fixture(name: &str, dir: &Path, as_name: &str) -> PathBuf {
    let target = dir.join(as_name);
    fs::copy(fixture(name), &target).expect("copy fixture");
    target
}
