//! Corrupted or partial sessions read as absent; they never surface as
//! errors and are never reported valid.

use std::fs;

use pje_auth_core::session::{COOKIES_FILE, METADATA_FILE, STATE_FILE};
use pje_auth_core::{AuthMethod, SessionStatus};

use crate::support::session_fixtures::{SAMPLE_STATE, artifact, sample_cookies, temp_store};

fn saved_store() -> (tempfile::TempDir, pje_auth_core::SessionStore) {
    let (temp_dir, store) = temp_store();
    store
        .save("default", AuthMethod::Certificate, sample_cookies(), SAMPLE_STATE.to_vec())
        .expect("save");
    (temp_dir, store)
}

#[test]
fn p0_garbage_metadata_reads_as_absent() {
    let (temp_dir, store) = saved_store();
    fs::write(artifact(temp_dir.path(), "default", METADATA_FILE), b"\x00\xffnot json").expect("write");

    assert!(store.load("default").expect("load").is_none());
    assert_eq!(store.describe("default").expect("describe"), SessionStatus::Absent);
}

#[test]
fn p0_truncated_cookies_read_as_absent() {
    let (temp_dir, store) = saved_store();
    let path = artifact(temp_dir.path(), "default", COOKIES_FILE);
    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");

    assert!(store.load("default").expect("load").is_none());
}

#[test]
fn p0_non_json_state_reads_as_absent() {
    let (temp_dir, store) = saved_store();
    fs::write(artifact(temp_dir.path(), "default", STATE_FILE), b"<html>").expect("write");

    assert!(store.load("default").expect("load").is_none());
}

#[test]
fn p0_missing_artifact_reads_as_absent() {
    for missing in [METADATA_FILE, COOKIES_FILE, STATE_FILE] {
        let (temp_dir, store) = saved_store();
        fs::remove_file(artifact(temp_dir.path(), "default", missing)).expect("remove");

        assert!(
            store.load("default").expect("load").is_none(),
            "session without {missing} must read as absent"
        );
    }
}

#[test]
fn p0_metadata_for_other_profile_reads_as_absent() {
    let (temp_dir, store) = saved_store();
    let path = artifact(temp_dir.path(), "default", METADATA_FILE);
    let mut metadata: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
    metadata["profile_name"] = "someone_else".into();
    fs::write(&path, serde_json::to_vec(&metadata).expect("encode")).expect("write");

    assert!(store.load("default").expect("load").is_none());
}

#[test]
fn p0_unknown_auth_method_reads_as_absent() {
    let (temp_dir, store) = saved_store();
    let path = artifact(temp_dir.path(), "default", METADATA_FILE);
    let mut metadata: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
    metadata["auth_method"] = "password".into();
    fs::write(&path, serde_json::to_vec(&metadata).expect("encode")).expect("write");

    assert!(store.load("default").expect("load").is_none());
}

#[test]
fn p0_corrupted_session_can_be_replaced() {
    let (temp_dir, store) = saved_store();
    fs::write(artifact(temp_dir.path(), "default", METADATA_FILE), b"{").expect("write");

    store
        .save("default", AuthMethod::CloudIdentity, sample_cookies(), SAMPLE_STATE.to_vec())
        .expect("save over corrupted session");

    let session = store.load("default").expect("load").expect("present");
    assert_eq!(session.auth_method, AuthMethod::CloudIdentity);
}
