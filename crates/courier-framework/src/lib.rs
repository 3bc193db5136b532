//! # Courier Framework
//!
//! Dispatch machinery built on the core types.
//!
//! This layer provides:
//! - Axum-style handlers with extractors ([`Handler`], [`FromContext`])
//! - The handler registry keyed by `(exchange, routing_key)`
//! - [`Dispatcher`] for a single destination
//! - [`GroupDispatcher`] for scatter-gather over derived routing keys
//! - [`AsyncDispatcher`] for deferred dispatch reported through a [`ResultChannel`]
//!
//! Transports sit above this crate; they hand messages in and carry
//! responses out, and never see handlers directly.

pub mod channel;
pub mod context;
pub mod deferred;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod group;
pub mod handler;
pub mod registry;

pub use channel::{DiscardResultChannel, InMemoryResultChannel, ResultChannel};
pub use context::DispatchContext;
pub use deferred::{AsyncDispatcher, PendingDispatch};
pub use dispatcher::{DispatchOptions, DispatchRequest, Dispatcher};
pub use error::{ExtractError, ExtractResult};
pub use extractor::{Body, FromContext, Sender};
pub use group::{BodyFieldDeriver, GroupDispatcher, KeyDeriver, StaticKeys};
pub use handler::{
    BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerFn, IntoActionResponse, into_handler,
};
pub use registry::{HandlerRegistry, RegistryStats};
