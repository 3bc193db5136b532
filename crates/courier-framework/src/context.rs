//! Per-dispatch context handed to handlers.

use std::sync::Arc;

use courier_core::{Message, Route};

/// Everything a handler can see about the dispatch it is part of.
///
/// One context is created per destination: a group dispatch to three keys
/// creates three contexts that share the same `Arc<Message>`.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    route: Route,
    message: Arc<Message>,
}

impl DispatchContext {
    /// Creates a context for dispatching `message` to `route`.
    pub fn new(route: Route, message: Arc<Message>) -> Self {
        Self { route, message }
    }

    /// Returns the destination.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Returns the exchange.
    pub fn exchange(&self) -> &str {
        self.route.exchange()
    }

    /// Returns the routing key.
    pub fn routing_key(&self) -> &str {
        self.route.routing_key()
    }

    /// Returns the message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns a shared handle to the message.
    pub fn message_arc(&self) -> Arc<Message> {
        Arc::clone(&self.message)
    }
}
