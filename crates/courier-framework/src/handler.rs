//! Handler system for the Courier framework.
//!
//! This module defines the [`Handler`] trait. Handlers are plain async
//! functions: the trait is implemented through blanket implementations for
//! functions with different arities, similar to Axum's handler system.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::extractor::{Body, Sender};
//! use courier_core::ActionResponse;
//!
//! // No parameters, unit output: a plain success
//! async fn ping() {}
//!
//! // Extractors in, response out
//! async fn create(Body(order): Body<Order>, sender: Sender) -> ActionResponse {
//!     ActionResponse::success_with(serde_json::json!({ "orderId": order.id }))
//! }
//!
//! // Errors become system errors carrying the error text
//! async fn fallible(msg: Arc<Message>) -> Result<ActionResponse, MyError> {
//!     // ...
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::context::DispatchContext;
use crate::error::ExtractError;
use crate::extractor::FromContext;
use courier_core::{ActionResponse, codes};

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// IntoActionResponse
// ============================================================================

/// Conversion of a handler's output into an [`ActionResponse`].
pub trait IntoActionResponse {
    /// Performs the conversion.
    fn into_action_response(self) -> ActionResponse;
}

impl IntoActionResponse for ActionResponse {
    fn into_action_response(self) -> ActionResponse {
        self
    }
}

/// `()` is a success without payload.
impl IntoActionResponse for () {
    fn into_action_response(self) -> ActionResponse {
        ActionResponse::success()
    }
}

/// A bare JSON value is a success carrying that value.
impl IntoActionResponse for Value {
    fn into_action_response(self) -> ActionResponse {
        ActionResponse::success_with(self)
    }
}

/// `Err` is a handler fault and becomes a system error.
impl<T, E> IntoActionResponse for Result<T, E>
where
    T: IntoActionResponse,
    E: Display,
{
    fn into_action_response(self) -> ActionResponse {
        match self {
            Ok(value) => value.into_action_response(),
            Err(e) => ActionResponse::system_error(e.to_string()).with_code(codes::HANDLER_FAULT),
        }
    }
}

fn extraction_failed(err: ExtractError) -> ActionResponse {
    ActionResponse::business_failure(codes::INVALID_PAYLOAD, err.to_string())
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for message handlers.
///
/// # Blanket Implementation
///
/// This trait is automatically implemented for async functions that:
/// - Take 0-8 parameters that implement [`FromContext`]
/// - Return a value implementing [`IntoActionResponse`]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = ActionResponse> + Send + 'static;

    /// Call the handler with the given context.
    fn call(self, ctx: Arc<DispatchContext>) -> Self::Future;
}

// ============================================================================
// Type erasure
// ============================================================================

/// A wrapper that converts a function into a boxed handler.
pub struct HandlerFn<F, T> {
    f: F,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T> {
    /// Creates a new handler function wrapper.
    pub fn new(f: F) -> Self {
        Self {
            f,
            name: std::any::type_name::<F>(),
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, T> Clone for HandlerFn<F, T> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// Execute the handler with the given context.
    fn call(&self, ctx: Arc<DispatchContext>) -> BoxFuture<'static, ActionResponse>;

    /// A name for logs.
    fn name(&self) -> &str {
        "handler"
    }
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T> + Send + Sync,
    T: 'static,
{
    fn call(&self, ctx: Arc<DispatchContext>) -> BoxFuture<'static, ActionResponse> {
        let f = self.f.clone();
        Box::pin(f.call(ctx))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Convert a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T> + Send + Sync + 'static,
    T: 'static,
{
    Arc::new(HandlerFn::new(f))
}

// ============================================================================
// Handler implementations for functions (Axum-style)
// ============================================================================

impl<F, Fut> Handler<()> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoActionResponse,
{
    type Future = BoxFuture<'static, ActionResponse>;

    fn call(self, _ctx: Arc<DispatchContext>) -> Self::Future {
        Box::pin(async move { (self)().await.into_action_response() })
    }
}

/// Macro to generate Handler implementations for functions with different arities.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: IntoActionResponse,
            $( $ty: FromContext + Send + 'static, )*
        {
            type Future = BoxFuture<'static, ActionResponse>;

            fn call(self, ctx: Arc<DispatchContext>) -> Self::Future {
                Box::pin(async move {
                    $(
                        let $ty = match $ty::from_context(&ctx) {
                            Ok(value) => value,
                            Err(e) => return extraction_failed(e),
                        };
                    )*

                    (self)($($ty,)*).await.into_action_response()
                })
            }
        }
    };
}

impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{Body, Sender};
    use courier_core::{ActionStatus, Message, Route};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Order {
        order_id: u64,
    }

    fn ctx(message: Message) -> Arc<DispatchContext> {
        Arc::new(DispatchContext::new(
            Route::new("orders", "created"),
            Arc::new(message),
        ))
    }

    #[tokio::test]
    async fn test_unit_handler_is_success() {
        let handler = into_handler(|| async {});
        let resp = handler.call(ctx(Message::default())).await;
        assert_eq!(resp, ActionResponse::success());
    }

    #[tokio::test]
    async fn test_extractor_handler() {
        let handler = into_handler(|Body(order): Body<Order>, sender: Sender| async move {
            json!({ "orderId": order.order_id, "by": sender.user_name })
        });

        let msg = Message::new(json!({ "orderId": 42 })).with_user(1, "alice");
        let resp = handler.call(ctx(msg)).await;

        assert_eq!(resp.status, ActionStatus::Success);
        assert_eq!(resp.data, Some(json!({ "orderId": 42, "by": "alice" })));
    }

    #[tokio::test]
    async fn test_failed_extraction_is_invalid_payload() {
        let handler = into_handler(|Body(_order): Body<Order>| async {});
        let resp = handler.call(ctx(Message::new(json!("nope")))).await;

        assert_eq!(resp.status, ActionStatus::BusinessFailure);
        assert_eq!(resp.code(), Some(codes::INVALID_PAYLOAD));
    }

    #[tokio::test]
    async fn test_err_output_is_handler_fault() {
        let handler =
            into_handler(|| async { Err::<ActionResponse, _>("inventory service unavailable") });
        let resp = handler.call(ctx(Message::default())).await;

        assert_eq!(resp.status, ActionStatus::SystemError);
        assert_eq!(resp.code(), Some(codes::HANDLER_FAULT));
        assert_eq!(
            resp.message.as_deref(),
            Some("inventory service unavailable")
        );
    }

    #[test]
    fn test_handler_name_is_recorded() {
        async fn named() {}
        let handler = into_handler(named);
        assert!(handler.name().ends_with("named"));
    }
}
