//! Core library for tocaro-export - Tocaro group and message export.
//!
//! This crate provides:
//! - Configuration loading and management
//! - XDG-compliant path resolution
//! - Schema and example config generation
//! - Tocaro sign-in session and API client
//! - JSON export of groups and message histories
//! - Common types and error handling

pub mod config;
pub mod error;
pub mod export;
pub mod paths;
pub mod schema;
pub mod tocaro;

pub use config::{
    AccountConfig, AppConfig, ExportConfig, LogLevel, LoggingConfig, OutputConfig, RuntimeConfig,
    TocaroConfig,
};
pub use error::{CoreError, Result};
pub use export::{ExportSummary, Exporter, ExporterOptions, MessageSelection, save_json};
pub use paths::{AppPaths, default_data_dir};
pub use schema::{generate_example_config, generate_schema, write_generated_files};
pub use tocaro::{
    AuthSession, Group, GroupKind, GroupType, Message, PaginationOptions, SessionConfig,
    TocaroClient,
};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "tocaro-export";

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
