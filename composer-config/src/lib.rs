//! Configuration for the composer engine.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file,
//! and `COMPOSER_*` environment variables.
//!
//! ```toml
//! [resolution]
//! tool_fallback = "by_save_as"
//!
//! [runner]
//! max_concurrent_calls = 4
//! call_timeout_ms = 30000
//!
//! [telemetry]
//! filter = "composer_engine=debug,info"
//! ```

#![warn(missing_docs, clippy::pedantic)]

use std::path::{Path, PathBuf};

use composer_templates::ToolFallback;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable selecting [`ResolutionConfig::tool_fallback`].
pub const ENV_TOOL_FALLBACK: &str = "COMPOSER_TOOL_FALLBACK";
/// Environment variable overriding [`RunnerConfig::max_concurrent_calls`].
pub const ENV_MAX_CONCURRENT_CALLS: &str = "COMPOSER_MAX_CONCURRENT_CALLS";
/// Environment variable overriding [`RunnerConfig::call_timeout_ms`].
pub const ENV_CALL_TIMEOUT_MS: &str = "COMPOSER_CALL_TIMEOUT_MS";
/// Environment variable overriding [`TelemetryConfig::filter`].
pub const ENV_LOG: &str = "COMPOSER_LOG";

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ComposerConfig`].
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config value for `{key}`: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// Variable resolution settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolutionConfig {
    /// How tool-sourced variables fall back to preprocessor results.
    pub tool_fallback: ToolFallback,
}

/// Preprocessor runner settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Upper bound on tool calls in flight at once. `1` runs sequentially.
    pub max_concurrent_calls: usize,
    /// Per-call timeout; `None` waits indefinitely.
    pub call_timeout_ms: Option<u64>,
    /// Discard results whose selection left the document mid-run.
    pub drop_late_results: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 1,
            call_timeout_ms: None,
            drop_late_results: true,
        }
    }
}

/// Submission gate settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Allow sending a message with no template and no text.
    pub allow_empty_message: bool,
}

/// Text flattening settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlattenConfig {
    /// Inserted between top-level paragraphs.
    pub paragraph_separator: String,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            paragraph_separator: "\n".to_owned(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Include event targets in log lines.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            with_target: false,
        }
    }
}

/// Complete composer configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposerConfig {
    /// Variable resolution.
    pub resolution: ResolutionConfig,
    /// Preprocessor runner.
    pub runner: RunnerConfig,
    /// Submission gate.
    pub gate: GateConfig,
    /// Text flattening.
    pub flatten: FlattenConfig,
    /// Logging.
    pub telemetry: TelemetryConfig,
}

impl ComposerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the errors of [`ComposerConfig::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "composer config loaded");
        Self::from_toml_str(&source)
    }

    /// Applies `COMPOSER_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable does not parse.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value does not parse.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TOOL_FALLBACK) {
            self.resolution.tool_fallback = match raw.trim() {
                "by_save_as" => ToolFallback::BySaveAs,
                "first_result" => ToolFallback::FirstResult,
                other => {
                    return Err(ConfigError::Invalid {
                        key: ENV_TOOL_FALLBACK,
                        reason: format!("expected `by_save_as` or `first_result`, got `{other}`"),
                    });
                }
            };
        }

        if let Some(raw) = lookup(ENV_MAX_CONCURRENT_CALLS) {
            self.runner.max_concurrent_calls =
                raw.trim().parse().map_err(|err| ConfigError::Invalid {
                    key: ENV_MAX_CONCURRENT_CALLS,
                    reason: format!("{err}"),
                })?;
        }

        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_MS) {
            let raw = raw.trim();
            self.runner.call_timeout_ms = if raw.is_empty() {
                None
            } else {
                Some(raw.parse().map_err(|err| ConfigError::Invalid {
                    key: ENV_CALL_TIMEOUT_MS,
                    reason: format!("{err}"),
                })?)
            };
        }

        if let Some(raw) = lookup(ENV_LOG) {
            self.telemetry.filter = raw;
        }

        self.validate()
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `max_concurrent_calls` is zero or
    /// `call_timeout_ms` is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.runner.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid {
                key: "runner.max_concurrent_calls",
                reason: "must be at least 1".into(),
            });
        }
        if self.runner.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                key: "runner.call_timeout_ms",
                reason: "must be positive when set".into(),
            });
        }
        Ok(())
    }
}
