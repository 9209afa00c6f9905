//! CLI entry point for pje-auth.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{CertCommand, Cli, Command, ConfigCommand, SessionCommand};

fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    init_tracing(default_level);
    debug!(?cli, "CLI arguments parsed");

    match cli.command {
        Command::Session { command } => match command {
            SessionCommand::Status { profile, json } => {
                commands::run_session_status_command(profile.profile.as_deref(), json)
            }
            SessionCommand::Clear { profile } => {
                commands::run_session_clear_command(profile.profile.as_deref())
            }
            SessionCommand::Import {
                state,
                method,
                profile,
            } => commands::run_session_import_command(&state, method.into(), profile.profile.as_deref()),
            SessionCommand::Seed { profile } => {
                commands::run_session_seed_command(profile.profile.as_deref())
            }
        },
        Command::Cert { command } => match command {
            CertCommand::Status(args) => commands::run_cert_status_command(&args),
            CertCommand::RememberSecret => commands::run_cert_remember_secret_command(),
            CertCommand::ForgetSecret => commands::run_cert_forget_secret_command(),
        },
        Command::Config { command } => match command {
            ConfigCommand::Show => commands::run_config_show_command(),
        },
    }
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}
