//! Configuration management for ptymux.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Args;
use crate::pty::{default_shell, Geometry, ShellCommand, DEFAULT_TERM};
use crate::session::SessionOptions;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell spawned for every session.
    pub shell: ShellSection,
    /// Per-session settings.
    pub session: SessionSection,
    /// Resize coalescing.
    pub resize: ResizeSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Shell configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    /// Program to run; the platform shell when unset.
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Extra environment for the shell.
    pub env: BTreeMap<String, String>,
    /// Working directory for new shells.
    pub cwd: Option<PathBuf>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            env: BTreeMap::from([("TERM".to_string(), DEFAULT_TERM.to_string())]),
            cwd: None,
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Initial rows for sessions opened without a geometry.
    pub rows: u16,
    /// Initial columns for sessions opened without a geometry.
    pub cols: u16,
    pub read_buffer_size: usize,
    /// Output retained per session while nothing is subscribed.
    pub max_pending_bytes: usize,
    pub close_timeout_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let options = SessionOptions::default();
        let geometry = Geometry::default();
        Self {
            rows: geometry.rows,
            cols: geometry.cols,
            read_buffer_size: options.read_buffer_size,
            max_pending_bytes: options.max_pending_bytes,
            close_timeout_ms: options.close_timeout.as_millis() as u64,
        }
    }
}

/// Resize configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeSection {
    /// Quiet period before the latest requested size is applied.
    pub debounce_ms: u64,
}

impl Default for ResizeSection {
    fn default() -> Self {
        Self {
            debounce_ms: crate::resize::DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(shell) = var("PTYMUX_SHELL").filter(|s| !s.is_empty()) {
            self.shell.program = Some(shell);
        }

        if let Some(level) = var("PTYMUX_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref shell) = args.shell {
            self.shell.program = Some(shell.clone());
        }
        if let Some(rows) = args.rows {
            self.session.rows = rows;
        }
        if let Some(cols) = args.cols {
            self.session.cols = cols;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject values no session could be opened with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_geometry()?;
        if self.session.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "session.read_buffer_size must be positive".into(),
            ));
        }
        if matches!(&self.shell.program, Some(p) if p.trim().is_empty()) {
            return Err(ConfigError::Invalid("shell.program is empty".into()));
        }
        Ok(())
    }

    /// Geometry for sessions opened without an explicit size.
    pub fn default_geometry(&self) -> Result<Geometry, ConfigError> {
        Geometry::new(self.session.rows, self.session.cols).map_err(|_| {
            ConfigError::Invalid(format!(
                "session geometry {}x{} must be at least 1x1",
                self.session.rows, self.session.cols
            ))
        })
    }

    /// The command every session runs.
    pub fn shell_command(&self) -> ShellCommand {
        let program = self.shell.program.clone().unwrap_or_else(default_shell);
        let mut command = ShellCommand::new(program);
        for arg in &self.shell.args {
            command = command.arg(arg);
        }
        for (key, value) in &self.shell.env {
            command = command.env(key, value);
        }
        if let Some(ref dir) = self.shell.cwd {
            command = command.cwd(dir);
        }
        command
    }

    /// Convert to the options applied to each session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            read_buffer_size: self.session.read_buffer_size,
            max_pending_bytes: self.session.max_pending_bytes,
            close_timeout: Duration::from_millis(self.session.close_timeout_ms),
        }
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize.debounce_ms)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
