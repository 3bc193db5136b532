//! Configuration for the Courier runtime.
//!
//! Layered loading (defaults, files, environment, overrides) and validation
//! of dispatch and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig, TokenConfig, TokenKind,
};
pub use validation::validate_config;
