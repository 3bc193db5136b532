//! Configuration schema.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration.
//!
//! ```toml
//! [dispatch]
//! default_deadline_ms = 5000
//! group_concurrency = 8
//!
//! [dispatch.tokens]
//! kind = "sequence"
//! prefix = "orders"
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [logging.filters]
//! courier_framework = "trace"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Dispatch behaviour.
    pub dispatch: DispatchConfig,
    /// Logging setup.
    pub logging: LoggingConfig,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline applied to dispatches that do not set one. Unset means none.
    pub default_deadline_ms: Option<u64>,
    /// Maximum destinations of one group in flight; 0 means unbounded.
    pub group_concurrency: usize,
    /// Correlation token issuing.
    pub tokens: TokenConfig,
}

impl DispatchConfig {
    /// The default deadline as a duration.
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }
}

/// How correlation tokens are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// ULID strings.
    #[default]
    Ulid,
    /// `prefix-n` with a process-local counter.
    Sequence,
}

/// Token issuer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub kind: TokenKind,
    /// Prefix for [`TokenKind::Sequence`] tokens.
    pub prefix: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            kind: TokenKind::default(),
            prefix: default_token_prefix(),
        }
    }
}

fn default_token_prefix() -> String {
    "courier".to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether the runtime installs a subscriber at all.
    pub enabled: bool,
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file for [`LogOutput::File`].
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    pub thread_ids: bool,
    /// Include file name and line number.
    pub file_location: bool,
    pub span_events: SpanEventConfig,
    /// Per-target levels, e.g. `courier_framework = "trace"`.
    pub filters: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            rotation: LogRotation::default(),
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CourierConfig::default();
        assert_eq!(config.dispatch.default_deadline(), None);
        assert_eq!(config.dispatch.group_concurrency, 0);
        assert_eq!(config.dispatch.tokens.kind, TokenKind::Ulid);
        assert_eq!(config.dispatch.tokens.prefix, "courier");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.logging.enabled);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CourierConfig = serde_json::from_value(serde_json::json!({
            "dispatch": { "default_deadline_ms": 250, "tokens": { "kind": "sequence" } },
            "logging": { "level": "debug", "filters": { "courier_framework": "trace" } }
        }))
        .unwrap();

        assert_eq!(
            config.dispatch.default_deadline(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.dispatch.tokens.kind, TokenKind::Sequence);
        assert_eq!(config.dispatch.tokens.prefix, "courier");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.filters.get("courier_framework"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.logging.format, LogFormat::Compact);
    }
}
