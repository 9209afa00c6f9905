//! Certificate command handlers: status check and keychain passphrase.

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use pje_auth_core::certificate::{
    CERT_PATH_ENV, CERT_THUMBPRINT_ENV, CERT_TYPE_ENV, TOKEN_DIR_ENV, forget_passphrase,
    remember_passphrase, resolve_passphrase,
};
use pje_auth_core::{Backend, CertificateSource, Secret};
use tracing::{debug, info};

use crate::cli::CertStatusArgs;

pub fn run_cert_status_command(args: &CertStatusArgs) -> Result<()> {
    let source = resolve_source(args)?;
    let secret = resolve_passphrase().map(|(secret, origin)| {
        debug!(%origin, "using stored certificate passphrase");
        secret
    });

    let record = source
        .store()
        .load(source.backend, &source.locator, secret.as_ref())
        .map_err(|error| anyhow!("Certificate check failed: {error}"))?;
    let health = record.validate(args.warn_days);

    println!("{}", record.summarize_with(args.warn_days));
    println!("status = {health}");
    println!("backend = {}", record.backend);
    println!("subject = {}", record.subject);
    println!("issuer = {}", record.issuer);
    println!("serial_number = {}", record.serial_number);
    println!("thumbprint = {}", record.thumbprint);
    println!("fingerprint = {}", record.fingerprint);
    println!("not_before = {}", record.not_before.to_rfc3339());
    println!("not_after = {}", record.not_after.to_rfc3339());
    println!("days_until_expiry = {}", record.days_until_expiry);
    println!("has_private_key = {}", record.has_private_key);
    println!("locator = {}", record.locator);

    if !health.is_usable() {
        bail!("Certificate is not usable: {health}");
    }
    Ok(())
}

/// Command-line flags win over the environment.
fn resolve_source(args: &CertStatusArgs) -> Result<CertificateSource> {
    let backend = match args.backend {
        Some(backend) => Backend::from(backend),
        None => match non_blank_env(CERT_TYPE_ENV) {
            Some(value) => value.parse()?,
            None => Backend::LocalFile,
        },
    };

    let locator = match backend {
        Backend::LocalFile => args
            .path
            .as_ref()
            .map(|path| path.display().to_string())
            .or_else(|| non_blank_env(CERT_PATH_ENV))
            .ok_or_else(|| anyhow!("No certificate path: pass --path or set {CERT_PATH_ENV}"))?,
        Backend::HardwareToken => args
            .thumbprint
            .clone()
            .or_else(|| non_blank_env(CERT_THUMBPRINT_ENV))
            .unwrap_or_default(),
    };

    let token_dir = args
        .token_dir
        .clone()
        .or_else(|| non_blank_env(TOKEN_DIR_ENV).map(PathBuf::from));

    Ok(CertificateSource {
        backend,
        locator,
        token_dir,
    })
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub fn run_cert_remember_secret_command() -> Result<()> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let passphrase = line.trim_end_matches(['\r', '\n']);
    if passphrase.is_empty() {
        bail!("No passphrase provided on stdin");
    }

    remember_passphrase(&Secret::new(passphrase))
        .map_err(|error| anyhow!("Failed to store passphrase: {error}"))?;
    info!("Certificate passphrase stored in the system keychain");
    Ok(())
}

pub fn run_cert_forget_secret_command() -> Result<()> {
    let removed =
        forget_passphrase().map_err(|error| anyhow!("Failed to remove passphrase: {error}"))?;
    if removed {
        info!("Certificate passphrase removed from the system keychain");
    } else {
        info!("No certificate passphrase stored in the system keychain");
    }
    Ok(())
}
