//! Session artifacts stay owner-only; looser modes found on disk are
//! tightened on read.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;

use pje_auth_core::AuthMethod;
use pje_auth_core::session::{COOKIES_FILE, METADATA_FILE, STATE_FILE};

use crate::support::session_fixtures::{SAMPLE_STATE, artifact, sample_cookies, temp_store};

fn mode(path: &std::path::Path) -> u32 {
    fs::metadata(path).expect("metadata").permissions().mode() & 0o777
}

#[test]
fn p0_saved_artifacts_are_owner_only() {
    let (temp_dir, store) = temp_store();
    store
        .save("default", AuthMethod::Certificate, sample_cookies(), SAMPLE_STATE.to_vec())
        .expect("save");

    assert_eq!(mode(&temp_dir.path().join("default")), 0o700);
    for file in [METADATA_FILE, COOKIES_FILE, STATE_FILE] {
        assert_eq!(mode(&artifact(temp_dir.path(), "default", file)), 0o600, "{file}");
    }
}

#[test]
fn p0_loose_permissions_are_corrected_on_load() {
    let (temp_dir, store) = temp_store();
    store
        .save("default", AuthMethod::Certificate, sample_cookies(), SAMPLE_STATE.to_vec())
        .expect("save");
    let cookies = artifact(temp_dir.path(), "default", COOKIES_FILE);
    let dir = temp_dir.path().join("default");
    fs::set_permissions(&cookies, fs::Permissions::from_mode(0o644)).expect("chmod file");
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("chmod dir");

    assert!(store.load("default").expect("load").is_some());

    assert_eq!(mode(&cookies), 0o600);
    assert_eq!(mode(&dir), 0o700);
}

#[test]
fn p0_save_tightens_existing_directory() {
    let (temp_dir, store) = temp_store();
    let dir = temp_dir.path().join("default");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o777)).expect("chmod");

    store
        .save("default", AuthMethod::Certificate, Vec::new(), b"{}".to_vec())
        .expect("save");

    assert_eq!(mode(&dir), 0o700);
}
