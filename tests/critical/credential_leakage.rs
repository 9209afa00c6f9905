//! Cookie values and passphrases never reach `Debug` output or error
//! messages.

use pje_auth_core::{
    AutomationBridge, Backend, CertificateStore, Secret, SessionCookie, SessionStore,
    SessionStoreConfig,
};

use crate::support::session_fixtures::{SAMPLE_STATE, fixture};

#[test]
fn p0_secret_debug_is_redacted() {
    let secret = Secret::new("correct-horse");
    let rendered = format!("{secret:?}");

    assert!(!rendered.contains("correct-horse"), "{rendered}");
}

#[test]
fn p0_cookie_debug_hides_value() {
    let cookie = SessionCookie::new("JSESSIONID", "super-secret-token", "pje.tjes.jus.br");
    let rendered = format!("{cookie:?}");

    assert!(rendered.contains("JSESSIONID"));
    assert!(!rendered.contains("super-secret-token"), "{rendered}");
}

#[test]
fn p0_wrong_passphrase_error_does_not_echo_secret() {
    let error = CertificateStore::default()
        .load(
            Backend::LocalFile,
            &fixture("valid.pfx").display().to_string(),
            Some(&Secret::new("hunter2-guess")),
        )
        .expect_err("wrong passphrase");
    let message = error.to_string();

    assert!(!message.contains("hunter2-guess"), "{message}");
    assert!(!format!("{error:?}").contains("hunter2-guess"));
}

#[test]
fn p0_browser_params_debug_hides_cookie_values_and_state() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let bridge = AutomationBridge::new(SessionStore::new(SessionStoreConfig::new(temp_dir.path())));
    let cookies = vec![SessionCookie::new("JSESSIONID", "super-secret-token", "pje.tjes.jus.br")];
    let session = bridge
        .on_authenticated("default", pje_auth_core::AuthMethod::Certificate, cookies, SAMPLE_STATE.to_vec())
        .expect("save");

    let params = bridge.seed(&session).expect("seed");
    let rendered = format!("{params:?}");

    assert!(!rendered.contains("super-secret-token"), "{rendered}");
    assert!(!rendered.contains("localStorage"), "{rendered}");
}
