//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSIFT_CONFIG` (environment variable)
//! 2. `~/.config/mailsift/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsift\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::export::eml::ArchiveTemplate;
use crate::extract::assemble::AssembleOptions;
use crate::extract::inline::InlineMode;
use crate::fetch::{FetchOptions, SortOrder};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Batch extraction settings.
    pub fetch: FetchConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the run log and `errors.txt`.
    pub log_dir: Option<PathBuf>,
}

/// Batch extraction settings. Every key has a command-line override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub sort_order: SortOrder,
    /// Maximum number of messages per run (0 = all).
    pub limit: usize,
    /// Write an archival `.eml` file per message.
    pub save_to_file: bool,
    /// Where attachments and archive files are written.
    pub output_dir: PathBuf,
    /// Comma-separated extensions to keep (empty = all).
    pub allowed_extensions: String,
    pub delete_after_read: bool,
    /// Folder to move processed messages to (empty = leave in place).
    pub move_to_folder: String,
    /// Only delete/move messages that had at least one attachment.
    pub attachments_required: bool,
    /// Rewrite the first `cid:` reference per image, or all of them.
    pub inline_rewrite: InlineMode,
    /// Per-message time budget in seconds (0 = none).
    pub message_timeout_secs: u64,
    pub abort_on_fetch_error: bool,
    /// Archive template file.
    pub template: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::Asc,
            limit: 100,
            save_to_file: true,
            output_dir: PathBuf::from("input/"),
            allowed_extensions: String::new(),
            delete_after_read: false,
            move_to_folder: String::new(),
            attachments_required: false,
            inline_rewrite: InlineMode::First,
            message_timeout_secs: 0,
            abort_on_fetch_error: false,
            template: None,
        }
    }
}

impl FetchConfig {
    /// Per-message options. Loads the template file if one is configured.
    pub fn assemble_options(&self) -> Result<AssembleOptions> {
        let mut options = AssembleOptions::new(&self.output_dir);
        options.walk = options.walk.with_allowed_extensions(&self.allowed_extensions);
        options.attachments_required = self.attachments_required;
        options.save_to_file = self.save_to_file;
        options.inline_mode = self.inline_rewrite;
        options.message_timeout =
            (self.message_timeout_secs > 0).then(|| Duration::from_secs(self.message_timeout_secs));
        if let Some(ref path) = self.template {
            options.template = ArchiveTemplate::load(path)?;
        }
        Ok(options)
    }

    /// Batch-level options.
    pub fn fetch_options(&self) -> FetchOptions {
        let target = self.move_to_folder.trim();
        FetchOptions {
            sort_order: self.sort_order,
            limit: self.limit,
            delete_after_read: self.delete_after_read,
            move_to_folder: (!target.is_empty()).then(|| target.to_string()),
            abort_on_fetch_error: self.abort_on_fetch_error,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSIFT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailsift").join("config.toml"))
}

/// Return the directory for the run log and the error log.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}

/// Return the run log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    log_dir(config).join("mailsift.log")
}
