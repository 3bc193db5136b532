//! Courier Runtime - configuration, logging and wiring for Courier.
//!
//! This crate provides:
//! - Layered configuration via figment (`ConfigLoader`, `CourierConfig`)
//! - Logging setup over tracing-subscriber (`LoggingBuilder`)
//! - The composition root (`CourierRuntime`)
//!
//! ```ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder().build()?;
//!     runtime.register("orders", "created", create_order)?;
//!
//!     let token = runtime.process_async("orders", "created", message);
//!     let response = runtime.collect(&token).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig, DispatchConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros, re-exported for convenience.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
