//! Interrupted writes: a staged file that never got renamed must not change
//! what readers see.

use std::fs;

use pje_auth_core::session::durable::{StagedWrite, is_staging_leftover};
use pje_auth_core::session::{COOKIES_FILE, METADATA_FILE, STATE_FILE};
use pje_auth_core::{AuthMethod, ClearOutcome, SessionLookup};

use crate::support::session_fixtures::{SAMPLE_STATE, artifact, sample_cookies, temp_store};

#[test]
fn p0_interrupted_resave_never_mixes_sessions() {
    let (temp_dir, store) = temp_store();
    store
        .save("default", AuthMethod::Certificate, sample_cookies(), SAMPLE_STATE.to_vec())
        .expect("first save");
    let state = artifact(temp_dir.path(), "default", STATE_FILE);
    let old_state = fs::read(&state).expect("read state");

    // A directory in place of state.json stops the re-save right after the
    // new cookies are committed.
    fs::remove_file(&state).expect("remove state");
    fs::create_dir_all(state.join("blocker")).expect("block state");
    store
        .save("default", AuthMethod::CloudIdentity, Vec::new(), b"{}".to_vec())
        .expect_err("re-save must fail");

    // On disk now: new cookies next to the old state, as after a crash
    // between the two renames.
    fs::remove_dir_all(&state).expect("unblock state");
    fs::write(&state, old_state).expect("restore old state");
    assert_eq!(
        fs::read(artifact(temp_dir.path(), "default", COOKIES_FILE)).expect("cookies"),
        b"[]"
    );

    assert!(store.load("default").expect("load").is_none());
    assert!(matches!(store.lookup("default").expect("lookup"), SessionLookup::NotFound));
}

#[test]
fn p0_uncommitted_metadata_keeps_previous_session() {
    let (temp_dir, store) = temp_store();
    let saved = store
        .save("default", AuthMethod::Certificate, sample_cookies(), SAMPLE_STATE.to_vec())
        .expect("save");

    let target = artifact(temp_dir.path(), "default", METADATA_FILE);
    let staged = StagedWrite::stage(&target, b"{\"profile_name\":\"half").expect("stage");
    let leftover = staged.staged_path().to_path_buf();
    // Process dies before commit: the temp file is never cleaned up.
    std::mem::forget(staged);

    assert!(leftover.exists());
    let loaded = store.load("default").expect("load").expect("previous session");
    assert_eq!(loaded.created_at, saved.created_at);
    assert_eq!(loaded.auth_method, AuthMethod::Certificate);
}

#[test]
fn p0_dropped_staged_write_leaves_no_file() {
    let (temp_dir, _store) = temp_store();
    let dir = temp_dir.path().join("default");
    fs::create_dir_all(&dir).expect("mkdir");

    let staged = StagedWrite::stage(&dir.join(COOKIES_FILE), b"[]").expect("stage");
    let leftover = staged.staged_path().to_path_buf();
    drop(staged);

    assert!(!leftover.exists());
    assert!(!dir.join(COOKIES_FILE).exists());
}

#[test]
fn p0_crash_before_first_metadata_write_reads_as_absent() {
    let (temp_dir, store) = temp_store();
    let dir = temp_dir.path().join("fresh");
    fs::create_dir_all(&dir).expect("mkdir");
    // Cookies committed, process died before state and metadata.
    fs::write(dir.join(COOKIES_FILE), b"[]").expect("write cookies");
    std::mem::forget(StagedWrite::stage(&dir.join(METADATA_FILE), b"{").expect("stage"));

    assert!(store.load("fresh").expect("load").is_none());
}

#[test]
fn p0_clear_removes_staging_leftovers() {
    let (temp_dir, store) = temp_store();
    store
        .save("default", AuthMethod::Certificate, Vec::new(), b"{}".to_vec())
        .expect("save");
    let target = artifact(temp_dir.path(), "default", METADATA_FILE);
    std::mem::forget(StagedWrite::stage(&target, b"partial").expect("stage"));

    assert_eq!(store.clear("default").expect("clear"), ClearOutcome::Removed);

    let dir = temp_dir.path().join("default");
    let leftovers = fs::read_dir(&dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|entry| is_staging_leftover(&entry.file_name().to_string_lossy()))
                .count()
        })
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}
