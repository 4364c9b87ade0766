//! Configuration for eventual results.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable toggling the redundant-settle warning.
pub const ENV_WARN_ON_REDUNDANT_SETTLE: &str = "EVENTUAL_WARN_ON_REDUNDANT_SETTLE";

/// Environment variable selecting the diagnostics mode.
pub const ENV_DIAGNOSTICS: &str = "EVENTUAL_DIAGNOSTICS";

/// Behavior knobs shared by every result created from one [`Env`](crate::Env).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Emit a warning when something tries to settle an already settled result.
    ///
    /// The attempt is ignored either way.
    #[serde(default = "default_warn_on_redundant_settle")]
    pub warn_on_redundant_settle: bool,

    /// Where swallowed failure-callback errors are reported when no sink is
    /// injected explicitly.
    #[serde(default)]
    pub diagnostics: DiagnosticsMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warn_on_redundant_settle: default_warn_on_redundant_settle(),
            diagnostics: DiagnosticsMode::default(),
        }
    }
}

impl Config {
    /// Set whether redundant settle attempts are logged.
    #[must_use]
    pub const fn warn_on_redundant_settle(mut self, enabled: bool) -> Self {
        self.warn_on_redundant_settle = enabled;
        self
    }

    /// Set the diagnostics mode.
    #[must_use]
    pub const fn diagnostics(mut self, mode: DiagnosticsMode) -> Self {
        self.diagnostics = mode;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(enabled) = lookup(ENV_WARN_ON_REDUNDANT_SETTLE).and_then(|v| parse_flag(&v)) {
            config.warn_on_redundant_settle = enabled;
        }

        if let Some(mode) = lookup(ENV_DIAGNOSTICS) {
            config.diagnostics = match mode.trim().to_lowercase().as_str() {
                "silent" | "off" | "none" => DiagnosticsMode::Silent,
                _ => DiagnosticsMode::Tracing,
            };
        }

        config
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParseFailed`] if the text is not valid TOML or
    /// does not match the expected shape.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config_parse_failed(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigReadFailed`] if the file cannot be read and
    /// [`Error::ConfigParseFailed`] if its contents are invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&content)
    }
}

/// Default destination for swallowed failure-callback errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsMode {
    /// Report through `tracing` at error level.
    #[default]
    Tracing,
    /// Drop reports.
    Silent,
}

impl std::fmt::Display for DiagnosticsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tracing => write!(f, "tracing"),
            Self::Silent => write!(f, "silent"),
        }
    }
}

const fn default_warn_on_redundant_settle() -> bool {
    cfg!(debug_assertions)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
