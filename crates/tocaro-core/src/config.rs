//! Configuration types and loading for the application.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::export::ExporterOptions;
use crate::paths::{expand_str_path, write_default_config};
use crate::tocaro::{GroupType, PaginationOptions, SessionConfig};
use crate::{AppPaths, CoreError, env_prefix};

/// Placeholder shown instead of secrets.
const REDACTED: &str = "********";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "Application Configuration",
    description = "Main configuration for the application"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Tocaro account credentials.
    pub account: AccountConfig,

    /// Tocaro service settings.
    pub tocaro: TocaroConfig,

    /// Group selection and pagination settings.
    pub export: ExportConfig,

    /// Output location.
    pub output: OutputConfig,

    /// Runtime behavior configuration.
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// Environment variables such as `TOCARO_EXPORT__ACCOUNT__PASSWORD`
    /// override file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        let env_prefix = env_prefix();
        let built = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("export.group_type", "show")?
            .set_default("export.interval", 0.3)?
            .set_default("runtime.timeout", 60_i64)?
            .set_default("runtime.fail_fast", true)?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
            .build()?;

        let mut config: Self = built.try_deserialize()?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }

        Ok(config)
    }

    /// Email and password, if both are set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] naming the missing keys.
    pub fn credentials(&self) -> std::result::Result<(&str, &str), CoreError> {
        let email = self.account.email.trim();
        let password = self.account.password.as_str();
        if email.is_empty() || password.is_empty() {
            return Err(CoreError::Config(
                "account.email and account.password must be set (or TOCARO_EXPORT__ACCOUNT__EMAIL / TOCARO_EXPORT__ACCOUNT__PASSWORD)"
                    .to_string(),
            ));
        }
        Ok((email, password))
    }

    /// Session settings derived from the `tocaro` and `runtime` sections.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            base_url: self.tocaro.base_url.clone(),
            commit_label: self.tocaro.commit_label.clone(),
            failure_phrase: self.tocaro.failure_phrase.clone(),
            timeout: self
                .runtime
                .timeout
                .map_or(defaults.timeout, Duration::from_secs),
            user_agent: defaults.user_agent,
        }
    }

    /// Pagination settings derived from the `export` section.
    #[must_use]
    pub fn pagination_options(&self) -> PaginationOptions {
        PaginationOptions {
            max_pages: self.export.max_pages,
            ..PaginationOptions::with_delay_secs(self.export.interval)
        }
    }

    /// Exporter settings derived from the `export` and `runtime` sections.
    #[must_use]
    pub fn exporter_options(&self) -> ExporterOptions {
        ExporterOptions {
            group_type: self.export.group_type,
            pagination: self.pagination_options(),
            excludes: self.export.excludes.clone(),
            with_groups: self.export.with_groups,
            fail_fast: self.runtime.fail_fast,
        }
    }

    /// Directory export files are written to.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured path cannot be expanded.
    pub fn output_dir(&self, paths: &AppPaths) -> Result<PathBuf> {
        match self.output.path.as_deref() {
            Some(path) if !path.trim().is_empty() => expand_str_path(path),
            _ => Ok(paths.data_dir.join("exports")),
        }
    }

    /// A copy with the password masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.account.password.is_empty() {
            copy.account.password = REDACTED.to_string();
        }
        copy
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl LogLevel {
    /// The matching `log` filter.
    #[must_use]
    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Account credentials. Prefer environment variables for the password.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Tocaro account credentials")]
pub struct AccountConfig {
    /// Sign-in email address.
    pub email: String,

    /// Sign-in password. Can be supplied as `TOCARO_EXPORT__ACCOUNT__PASSWORD`.
    pub password: String,
}

/// Service endpoint and sign-in page wording.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Tocaro service settings")]
pub struct TocaroConfig {
    /// Base URL of the service.
    pub base_url: String,

    /// Label of the sign-in button, sent as the `commit` form field.
    pub commit_label: String,

    /// Message shown by the sign-in page when credentials are rejected.
    pub failure_phrase: String,
}

impl Default for TocaroConfig {
    fn default() -> Self {
        Self {
            base_url: SessionConfig::DEFAULT_BASE_URL.to_string(),
            commit_label: SessionConfig::DEFAULT_COMMIT_LABEL.to_string(),
            failure_phrase: SessionConfig::DEFAULT_FAILURE_PHRASE.to_string(),
        }
    }
}

/// Which groups to export and how fast.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Group selection and pagination settings")]
pub struct ExportConfig {
    /// Groups listing to use: `show` or `hide`.
    pub group_type: GroupType,

    /// Seconds to wait between message pages (default: 0.3).
    #[schemars(range(min = 0))]
    pub interval: f64,

    /// Skip groups whose name contains this text. Empty disables the filter.
    pub excludes: String,

    /// Only export groups whose name contains this text. Empty disables the filter.
    pub includes: String,

    /// Also write `groups.json` when exporting messages.
    pub with_groups: bool,

    /// Abort a group after this many non-empty pages. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub max_pages: Option<usize>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            group_type: GroupType::Show,
            interval: 0.3,
            excludes: String::new(),
            includes: String::new(),
            with_groups: false,
            max_pages: None,
        }
    }
}

/// Output location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Where export files are written")]
pub struct OutputConfig {
    /// Output directory. Supports ~ and environment variables.
    /// Defaults to `exports/` under the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Runtime behavior configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Runtime behavior configuration")]
pub struct RuntimeConfig {
    /// Timeout in seconds for each HTTP request (default: 60).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub timeout: Option<u64>,

    /// Stop on the first group that fails to export.
    pub fail_fast: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: Some(60),
            fail_fast: true,
        }
    }
}
