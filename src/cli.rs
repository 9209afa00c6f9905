//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use pje_auth_core::{AuthMethod, Backend};
use pje_auth_core::certificate::DEFAULT_WARN_DAYS;

/// Manage PJE portal sessions and signing certificates.
///
/// Sessions are cached per profile so browser automation can reuse a
/// completed login until it expires.
#[derive(Parser, Debug)]
#[command(name = "pje-auth")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and manage cached sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Inspect certificates and manage the stored passphrase
    Cert {
        #[command(subcommand)]
        command: CertCommand,
    },
    /// Show resolved configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show the status of a profile's session
    Status {
        #[command(flatten)]
        profile: ProfileArg,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a profile's session
    Clear {
        #[command(flatten)]
        profile: ProfileArg,
    },
    /// Register a browser storage-state export as a profile's session
    Import {
        /// Storage-state JSON file (`-` for stdin)
        #[arg(long)]
        state: PathBuf,
        /// How the exported login was performed
        #[arg(long, value_enum, default_value_t = MethodArg::CloudIdentity)]
        method: MethodArg,
        #[command(flatten)]
        profile: ProfileArg,
    },
    /// Print browser init parameters for a valid session
    Seed {
        #[command(flatten)]
        profile: ProfileArg,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProfileArg {
    /// Profile name (defaults to PJE_SESSION_NAME or tjes_pje_default)
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CertCommand {
    /// Validate the configured certificate and report its status
    Status(CertStatusArgs),
    /// Store the bundle passphrase in the system keychain (read from stdin)
    RememberSecret,
    /// Remove the bundle passphrase from the system keychain
    ForgetSecret,
}

#[derive(Args, Debug, Clone)]
pub struct CertStatusArgs {
    /// Certificate backend (defaults to PJE_CERT_TYPE)
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
    /// Bundle path for the local-file backend (defaults to PJE_CERT_PATH)
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// SHA-1 thumbprint for the hardware-token backend
    #[arg(long)]
    pub thumbprint: Option<String>,
    /// Directory of certificates exported from the token
    #[arg(long)]
    pub token_dir: Option<PathBuf>,
    /// Days before expiry to warn
    #[arg(long, default_value_t = DEFAULT_WARN_DAYS, value_parser = clap::value_parser!(i64).range(0..=3650))]
    pub warn_days: i64,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print every resolved setting with its diagnostic
    Show,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    Certificate,
    CloudIdentity,
}

impl From<MethodArg> for AuthMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Certificate => Self::Certificate,
            MethodArg::CloudIdentity => Self::CloudIdentity,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    LocalFile,
    HardwareToken,
}

impl From<BackendArg> for Backend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::LocalFile => Self::LocalFile,
            BackendArg::HardwareToken => Self::HardwareToken,
        }
    }
}
