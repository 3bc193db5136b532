//! # Courier
//!
//! Routes messages to handlers by `(exchange, routing_key)`.
//!
//! ## Architecture
//!
//! ```text
//!                 Delivery    ┌────────────────┐     ┌─────────────────┐
//! ┌───────────┐ ────────────▶ │                │ ──▶ │ Dispatcher      │ ──▶ handlers
//! │ Transport │               │ CourierRuntime │ ──▶ │ GroupDispatcher │ ──▶ handlers × N
//! └───────────┘ ◀──────────── │                │ ──▶ │ AsyncDispatcher │ ──▶ ResultChannel
//!              ActionResponse └────────────────┘     └─────────────────┘
//! ```
//!
//! - **Dispatcher**: one destination, one [`ActionResponse`](prelude::ActionResponse)
//! - **GroupDispatcher**: derived routing keys, responses in derivation order
//! - **AsyncDispatcher**: returns a correlation token now, publishes the result later
//! - **Handlers**: plain async functions taking extractors (Axum-style)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! async fn create(Body(order): Body<Order>) -> ActionResponse {
//!     ActionResponse::success_with(json!({ "orderId": order.id }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder().build()?;
//!     runtime.register("orders", "created", create)?;
//!
//!     let response = runtime.process("orders", "created", message).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Commonly used types.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use courier_runtime::{CourierConfig, CourierRuntime, RuntimeError, RuntimeResult};

    // Data model
    pub use courier_core::{
        ActionResponse, ActionStatus, CorrelationToken, DeriveError, Delivery, DispatchError,
        DispatchResult, Message, Route, codes,
    };

    // Dispatch
    pub use courier_framework::{
        AsyncDispatcher, BodyFieldDeriver, DispatchOptions, Dispatcher, GroupDispatcher,
        HandlerRegistry, InMemoryResultChannel, KeyDeriver, ResultChannel, StaticKeys,
    };

    // Handlers
    pub use courier_framework::{Body, FromContext, Sender};

    // Logging
    pub use courier_runtime::prelude::*;
}
