//! Storage failures surface as `SessionError::Storage`, never as a silent
//! success or a panic.

use std::fs;

use pje_auth_core::{AuthMethod, SessionError, SessionStore, SessionStoreConfig};

#[test]
fn p0_root_that_is_a_file_fails_to_save() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let root = temp_dir.path().join("not-a-dir");
    fs::write(&root, b"occupied").expect("write");
    let store = SessionStore::new(SessionStoreConfig::new(&root));

    let error = store
        .save("default", AuthMethod::Certificate, Vec::new(), b"{}".to_vec())
        .expect_err("save must fail");

    assert!(matches!(error, SessionError::Storage { .. }), "got {error:?}");
    assert!(error.to_string().contains("not-a-dir"));
}

#[test]
fn p0_root_that_is_a_file_reads_as_absent() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let root = temp_dir.path().join("not-a-dir");
    fs::write(&root, b"occupied").expect("write");
    let store = SessionStore::new(SessionStoreConfig::new(&root));

    assert!(store.load("default").expect("load").is_none());
}

#[test]
fn p0_artifact_that_is_a_directory_is_a_storage_error() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let store = SessionStore::new(SessionStoreConfig::new(temp_dir.path()));
    let dir = temp_dir.path().join("default");
    fs::create_dir_all(dir.join("metadata.json")).expect("mkdir");

    let error = store.load("default").expect_err("load must fail");

    assert!(matches!(error, SessionError::Storage { .. }), "got {error:?}");
}

#[test]
fn p0_invalid_state_is_rejected_before_touching_disk() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let store = SessionStore::new(SessionStoreConfig::new(temp_dir.path()));

    let error = store
        .save("default", AuthMethod::Certificate, Vec::new(), b"not json".to_vec())
        .expect_err("save must fail");

    assert!(matches!(error, SessionError::InvalidStorageState(_)), "got {error:?}");
    assert!(!temp_dir.path().join("default").exists());
}

#[test]
fn p0_path_traversal_profile_is_rejected() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let store = SessionStore::new(SessionStoreConfig::new(temp_dir.path().join("sessions")));

    for profile in ["..", "../other", "a/b", "", "with space"] {
        let error = store
            .save(profile, AuthMethod::Certificate, Vec::new(), b"{}".to_vec())
            .expect_err("bad profile must fail");
        assert!(matches!(error, SessionError::InvalidProfile(_)), "{profile:?}: got {error:?}");
    }
    assert!(!temp_dir.path().join("other").exists());
}
