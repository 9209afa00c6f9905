//! CLI command handlers.

mod cert;
mod config;
mod session;

pub use cert::{
    run_cert_forget_secret_command, run_cert_remember_secret_command, run_cert_status_command,
};
pub use config::run_config_show_command;
pub use session::{
    run_session_clear_command, run_session_import_command, run_session_seed_command,
    run_session_status_command,
};
