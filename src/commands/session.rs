//! Session command handlers: status, clear, import, seed.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use pje_auth_core::{
    AuthMethod, AutomationBridge, ClearOutcome, RuntimeSettings, SessionLookup, SessionStatus,
    SessionStore, SessionStoreConfig, format_age, render_status_report,
};
use serde_json::json;
use tracing::{info, warn};

struct SessionContext {
    settings: RuntimeSettings,
    store: SessionStore,
    profile: String,
}

fn session_context(profile: Option<&str>) -> Result<SessionContext> {
    let settings = RuntimeSettings::from_env();
    let config = SessionStoreConfig::from_settings(&settings)
        .map_err(|error| anyhow!("Cannot open session store: {error}"))?;
    let profile = profile
        .map(str::to_string)
        .unwrap_or_else(|| settings.default_profile.clone());
    Ok(SessionContext {
        store: SessionStore::new(config),
        settings,
        profile,
    })
}

pub fn run_session_status_command(profile: Option<&str>, as_json: bool) -> Result<()> {
    let ctx = session_context(profile)?;
    let dir = ctx.store.profile_dir(&ctx.profile)?;
    let status = ctx
        .store
        .describe(&ctx.profile)
        .map_err(|error| anyhow!("Failed to read session: {error}"))?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status_json(&ctx, &dir, &status))?
        );
    } else {
        print!(
            "{}",
            render_status_report(&ctx.profile, &dir, &status, ctx.store.max_age())
        );
    }
    Ok(())
}

fn status_json(ctx: &SessionContext, dir: &Path, status: &SessionStatus) -> serde_json::Value {
    let mut value = json!({
        "profile": ctx.profile,
        "directory": dir.display().to_string(),
        "status": status.label(),
        "max_age_hours": ctx.settings.session_max_age_hours.value,
    });
    match status {
        SessionStatus::Absent => {}
        SessionStatus::Valid {
            auth_method,
            created_at,
            last_used_at,
            age,
            remaining,
        } => {
            value["auth_method"] = json!(auth_method);
            value["created_at"] = json!(created_at);
            value["last_used_at"] = json!(last_used_at);
            value["age_seconds"] = json!(age.num_seconds());
            value["remaining_seconds"] = json!(remaining.num_seconds());
        }
        SessionStatus::Expired {
            auth_method,
            created_at,
            age,
        } => {
            value["auth_method"] = json!(auth_method);
            value["created_at"] = json!(created_at);
            value["age_seconds"] = json!(age.num_seconds());
        }
    }
    value
}

pub fn run_session_clear_command(profile: Option<&str>) -> Result<()> {
    let ctx = session_context(profile)?;
    let outcome = ctx
        .store
        .clear(&ctx.profile)
        .map_err(|error| anyhow!("Failed to clear session: {error}"))?;

    match outcome {
        ClearOutcome::Removed => println!("Session cleared for profile {}", ctx.profile),
        ClearOutcome::NotFound => println!("No session found for profile {}", ctx.profile),
    }
    Ok(())
}

pub fn run_session_import_command(state: &Path, method: AuthMethod, profile: Option<&str>) -> Result<()> {
    let ctx = session_context(profile)?;
    let export = read_state_input(state)?;
    let bridge = AutomationBridge::from_settings(ctx.store, &ctx.settings);

    let (session, warnings) = bridge
        .import(&ctx.profile, method, &export)
        .map_err(|error| anyhow!("Session import failed: {error}"))?;
    for warning in &warnings {
        warn!("{warning}");
    }

    info!(
        profile = %session.profile_name,
        auth_method = %session.auth_method,
        cookies = session.cookies.len(),
        "Session imported"
    );
    println!(
        "Session imported for profile {} ({} cookies, valid for {})",
        session.profile_name,
        session.cookies.len(),
        format_age(session.max_age)
    );
    Ok(())
}

fn read_state_input(state: &Path) -> Result<Vec<u8>> {
    if state.as_os_str() == "-" {
        let mut buffer = Vec::new();
        io::stdin()
            .read_to_end(&mut buffer)
            .context("Cannot read storage state from stdin")?;
        return Ok(buffer);
    }
    fs::read(state).with_context(|| format!("Cannot read storage state '{}'", state.display()))
}

pub fn run_session_seed_command(profile: Option<&str>) -> Result<()> {
    let ctx = session_context(profile)?;
    let lookup = ctx
        .store
        .lookup(&ctx.profile)
        .map_err(|error| anyhow!("Failed to read session: {error}"))?;

    let session = match lookup {
        SessionLookup::Valid(session) => session,
        SessionLookup::Expired(_) => bail!(
            "Session for profile {} expired; authenticate again to create a new one",
            ctx.profile
        ),
        SessionLookup::NotFound => bail!(
            "No session found for profile {}; authenticate first (or run `pje-auth session import`)",
            ctx.profile
        ),
    };

    let bridge = AutomationBridge::from_settings(ctx.store, &ctx.settings);
    let session = bridge
        .mark_used(session)
        .map_err(|error| anyhow!("Failed to update session: {error}"))?;
    let params = bridge
        .seed(&session)
        .map_err(|error| anyhow!("Failed to build browser parameters: {error}"))?;

    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}
