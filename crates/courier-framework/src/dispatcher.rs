//! Single-destination dispatcher.
//!
//! [`Dispatcher::process`] delivers one message to the handlers bound to one
//! `(exchange, routing_key)` pair and always produces exactly one
//! [`ActionResponse`]:
//!
//! 1. No handler bound: a business failure with code `NO_HANDLER`
//! 2. Handlers bound: each is invoked in registration order
//! 3. A handler error or panic becomes a system error; nothing propagates
//! 4. With several handlers the first failure wins, otherwise the last success
//!
//! ```rust,ignore
//! use courier_framework::{Dispatcher, HandlerRegistry};
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register("orders", "created", create_order)?;
//!
//! let dispatcher = Dispatcher::new(registry);
//! let response = dispatcher.process("orders", "created", message).await;
//! ```

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use tower::Service;
use tracing::{Instrument, debug, debug_span, error, trace, warn};

use crate::context::DispatchContext;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::registry::HandlerRegistry;
use courier_core::{ActionResponse, ActionStatus, Message, Route, codes};

/// Per-call dispatch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on the whole dispatch. Overrides the dispatcher default.
    pub deadline: Option<Duration>,
}

impl DispatchOptions {
    /// Options without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Dispatches messages to the handlers of a single destination.
///
/// The dispatcher holds no per-call state and is cheap to clone; clones share
/// the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    default_deadline: Option<Duration>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry` with no default deadline.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            default_deadline: None,
        }
    }

    /// Sets the deadline applied when a call does not specify one.
    pub fn with_default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Returns the registry handlers are resolved from.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Returns the default deadline.
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline
    }

    /// Dispatches `message` to `(exchange, routing_key)`.
    pub async fn process(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
    ) -> ActionResponse {
        self.process_with(exchange, routing_key, message, DispatchOptions::default())
            .await
    }

    /// Dispatches `message` to `(exchange, routing_key)` with explicit options.
    pub async fn process_with(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
        options: DispatchOptions,
    ) -> ActionResponse {
        self.dispatch(Route::new(exchange, routing_key), message.into(), options)
            .await
    }

    /// Dispatches to an already-built route.
    pub async fn dispatch(
        &self,
        route: Route,
        message: Arc<Message>,
        options: DispatchOptions,
    ) -> ActionResponse {
        let span = debug_span!("dispatch", route = %route);

        async move {
            let handlers = self
                .registry
                .resolve(route.exchange(), route.routing_key());

            if handlers.is_empty() {
                debug!("No handler bound to destination");
                return ActionResponse::no_handler(&route);
            }

            debug!(handler_count = handlers.len(), "Dispatching message");

            let ctx = Arc::new(DispatchContext::new(route.clone(), message));
            let run = run_handlers(handlers, ctx);

            let response = match options.deadline.or(self.default_deadline) {
                Some(deadline) => match tokio::time::timeout(deadline, run).await {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(
                            deadline_ms = deadline.as_millis() as u64,
                            "Dispatch exceeded its deadline"
                        );
                        ActionResponse::deadline_exceeded(&route, deadline)
                    }
                },
                None => run.await,
            };

            debug!(status = %response.status, "Dispatch finished");
            response
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("default_deadline", &self.default_deadline)
            .finish()
    }
}

/// Runs every handler in order; first failure wins, otherwise the last success.
async fn run_handlers(handlers: Vec<BoxedHandler>, ctx: Arc<DispatchContext>) -> ActionResponse {
    let mut first_failure: Option<ActionResponse> = None;
    let mut last_success: Option<ActionResponse> = None;

    for (index, handler) in handlers.iter().enumerate() {
        trace!(handler_index = index, handler = handler.name(), "Invoking handler");

        let response = invoke(handler, Arc::clone(&ctx)).await;
        if response.is_success() {
            last_success = Some(response);
        } else if first_failure.is_none() {
            first_failure = Some(response);
        }
    }

    first_failure
        .or(last_success)
        .unwrap_or_else(|| ActionResponse::no_handler(ctx.route()))
}

/// Invokes one handler, converting a panic into a system error.
async fn invoke(handler: &BoxedHandler, ctx: Arc<DispatchContext>) -> ActionResponse {
    let outcome = AssertUnwindSafe(async move { handler.call(ctx).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(response) => {
            if response.status == ActionStatus::SystemError {
                warn!(
                    handler = handler.name(),
                    code = response.code().unwrap_or("-"),
                    reason = response.message.as_deref().unwrap_or(""),
                    "Handler faulted"
                );
            }
            response
        }
        Err(payload) => {
            let reason = panic_message(&*payload);
            error!(handler = handler.name(), reason = %reason, "Handler panicked");
            ActionResponse::system_error(format!("handler panicked: {reason}"))
                .with_code(codes::HANDLER_PANIC)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

// ============================================================================
// Tower Service Implementation for Dispatcher
// ============================================================================

/// A single dispatch expressed as a value, for use with tower middleware.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Destination.
    pub route: Route,
    /// Message to deliver.
    pub message: Arc<Message>,
    /// Call options.
    pub options: DispatchOptions,
}

impl DispatchRequest {
    /// Creates a request without options.
    pub fn new(route: Route, message: impl Into<Arc<Message>>) -> Self {
        Self {
            route,
            message: message.into(),
            options: DispatchOptions::default(),
        }
    }

    /// Sets a deadline for this request.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.options.deadline = Some(deadline);
        self
    }
}

/// Tower Service implementation for Dispatcher.
///
/// Dispatch never fails at the service level: every outcome, including a
/// missing handler, is an [`ActionResponse`].
///
/// ```rust,ignore
/// use tower::{ServiceBuilder, ServiceExt};
///
/// let service = ServiceBuilder::new()
///     .concurrency_limit(64)
///     .service(dispatcher);
/// let response = service.oneshot(DispatchRequest::new(route, message)).await?;
/// ```
impl Service<DispatchRequest> for Dispatcher {
    type Response = ActionResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move {
            Ok(dispatcher
                .dispatch(req.route, req.message, req.options)
                .await)
        })
    }
}
