//! # Courier Core
//!
//! Plain data types shared by every layer of the Courier dispatch framework:
//!
//! - [`Message`] and [`Delivery`]: what the transport hands to the core
//! - [`Route`]: the `(exchange, routing_key)` destination pair
//! - [`ActionResponse`] and [`ActionStatus`]: the outcome of one dispatch
//! - [`CorrelationToken`] and [`TokenIssuer`]: handles for deferred dispatch
//! - [`DispatchError`] and [`DeriveError`]: call-shape failures
//!
//! Nothing in this crate performs I/O or spawns tasks.

pub mod error;
pub mod message;
pub mod response;
pub mod route;
pub mod token;

pub use error::{DeriveError, DeriveResult, DispatchError, DispatchResult};
pub use message::{Delivery, Message};
pub use response::{ActionResponse, ActionStatus, codes};
pub use route::Route;
pub use token::{CorrelationToken, SequenceTokenIssuer, TokenIssuer, UlidTokenIssuer};
