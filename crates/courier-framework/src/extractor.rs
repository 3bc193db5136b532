//! Extractor system for the Courier framework.
//!
//! This module provides the [`FromContext`] trait, which defines how types
//! can be extracted from a [`DispatchContext`] for use as handler parameters.
//!
//! ```rust,ignore
//! use courier_framework::extractor::{Body, Sender};
//!
//! #[derive(serde::Deserialize)]
//! struct CreateOrder { sku: String, qty: u32 }
//!
//! async fn create_order(Body(order): Body<CreateOrder>, sender: Sender) -> ActionResponse {
//!     // ...
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::context::DispatchContext;
use crate::error::ExtractError;
use courier_core::{Message, Route};

/// A trait for types that can be extracted from a [`DispatchContext`].
///
/// If extraction fails the handler is not called; the dispatch reports a
/// business failure with code
/// [`INVALID_PAYLOAD`](courier_core::codes::INVALID_PAYLOAD) instead.
pub trait FromContext: Sized {
    /// Attempts to extract this type from the given context.
    fn from_context(ctx: &DispatchContext) -> Result<Self, ExtractError>;
}

/// Extracts a shared handle to the whole message.
impl FromContext for Arc<Message> {
    fn from_context(ctx: &DispatchContext) -> Result<Self, ExtractError> {
        Ok(ctx.message_arc())
    }
}

/// Extracts the destination the message was dispatched to.
///
/// Useful for handlers bound to several keys, e.g. through group dispatch.
impl FromContext for Route {
    fn from_context(ctx: &DispatchContext) -> Result<Self, ExtractError> {
        Ok(ctx.route().clone())
    }
}

/// Optional parameters never fail extraction.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &DispatchContext) -> Result<Self, ExtractError> {
        Ok(T::from_context(ctx).ok())
    }
}

// ============================================================================
// Body
// ============================================================================

/// The message body deserialized into `T`.
#[derive(Debug, Clone)]
pub struct Body<T>(pub T);

impl<T> Body<T> {
    /// Consumes the extractor, returning the decoded body.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Body<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: DeserializeOwned> FromContext for Body<T> {
    fn from_context(ctx: &DispatchContext) -> Result<Self, ExtractError> {
        ctx.message()
            .body_as::<T>()
            .map(Body)
            .map_err(|e| ExtractError::InvalidBody {
                target: std::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// Sender
// ============================================================================

/// The user the message originates from.
///
/// Extraction fails when the message carries no user name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Originating user id.
    pub user_id: i64,
    /// Originating user name.
    pub user_name: String,
    /// Customer the user acts for.
    pub customer_id: i64,
}

impl FromContext for Sender {
    fn from_context(ctx: &DispatchContext) -> Result<Self, ExtractError> {
        let msg = ctx.message();
        if msg.user_name.is_empty() {
            return Err(ExtractError::MissingField("userName"));
        }
        Ok(Self {
            user_id: msg.user_id,
            user_name: msg.user_name.clone(),
            customer_id: msg.customer_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Region {
        region: String,
    }

    fn ctx(message: Message) -> DispatchContext {
        DispatchContext::new(Route::new("orders", "created"), Arc::new(message))
    }

    #[test]
    fn test_body_extracts_typed_payload() {
        let ctx = ctx(Message::new(json!({ "region": "east" })));
        let Body(region) = Body::<Region>::from_context(&ctx).unwrap();
        assert_eq!(region.region, "east");
    }

    #[test]
    fn test_body_mismatch_is_invalid_body() {
        let ctx = ctx(Message::new(json!([1, 2, 3])));
        let err = Body::<Region>::from_context(&ctx).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidBody { .. }));
    }

    #[test]
    fn test_sender_requires_user_name() {
        let anonymous = ctx(Message::default());
        assert!(matches!(
            Sender::from_context(&anonymous),
            Err(ExtractError::MissingField("userName"))
        ));

        let named = ctx(Message::default().with_user(9, "bob").with_customer_id(4));
        let sender = Sender::from_context(&named).unwrap();
        assert_eq!(sender.user_id, 9);
        assert_eq!(sender.customer_id, 4);
    }

    #[test]
    fn test_option_never_fails() {
        let anonymous = ctx(Message::default());
        let sender = Option::<Sender>::from_context(&anonymous).unwrap();
        assert!(sender.is_none());
    }

    #[test]
    fn test_route_extraction() {
        let route = Route::from_context(&ctx(Message::default())).unwrap();
        assert_eq!(route, Route::new("orders", "created"));
    }
}
