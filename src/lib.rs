//! PJE Auth Core Library
//!
//! Credential and session lifecycle management for automated access to the
//! PJE case-management portal: validating identity bundles, persisting and
//! rehydrating authenticated browser sessions, and resolving bounded runtime
//! settings from the environment.
//!
//! # Architecture
//!
//! - [`config`] - Environment settings resolved into always-valid bounded values
//! - [`session`] - Durable per-profile session storage and validity
//! - [`certificate`] - Local-file and hardware-token certificate validation
//! - [`bridge`] - Hand-off to and from the browser-automation layer

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod certificate;
pub mod config;
pub mod session;

// Re-export commonly used types
pub use bridge::{
    AuthenticatedArtifacts, AutomationBridge, BridgeError, BrowserAutomation,
    BrowserContextOptions, BrowserInitParams, DriverError, EnsuredSession, ImportError,
    ImportedState, import_storage_state,
};
pub use certificate::{
    Backend, CertificateError, CertificateHealth, CertificateRecord, CertificateSource,
    CertificateStore, ExportedCertificateRegistry, NoTokenRegistry, Secret, TokenRegistry,
    load_from_env,
};
pub use config::{Diagnostic, Resolved, RuntimeSettings, resolve_bounded, resolve_bounded_int};
pub use session::{
    AuthMethod, ClearOutcome, Session, SessionCookie, SessionError, SessionLookup, SessionStatus,
    SessionStore, SessionStoreConfig, format_age, render_status_report,
};
