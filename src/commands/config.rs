//! Config command handlers: show effective configuration.

use anyhow::Result;
use pje_auth_core::config::{
    RETRY_ATTEMPTS_ENV, Resolved, SESSION_MAX_AGE_ENV, TIMEOUT_ENV, RuntimeSettings,
};

pub fn run_config_show_command() -> Result<()> {
    let settings = RuntimeSettings::from_env();

    print_resolved(SESSION_MAX_AGE_ENV, "session_max_age_hours", &settings.session_max_age_hours);
    print_resolved(TIMEOUT_ENV, "timeout_seconds", &settings.timeout_seconds);
    print_resolved(RETRY_ATTEMPTS_ENV, "retry_attempts", &settings.retry_attempts);
    println!("default_profile = {}", settings.default_profile);
    println!(
        "session_root = {}",
        settings.session_root.as_ref().map_or_else(
            || "<unresolved>".to_string(),
            |path| path.display().to_string()
        )
    );

    Ok(())
}

fn print_resolved<T: std::fmt::Display>(env_name: &str, key: &str, resolved: &Resolved<T>) {
    println!(
        "{key} = {} ({}; {env_name})",
        resolved.value, resolved.diagnostic
    );
}
