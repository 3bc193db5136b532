//! Handler registry keyed by `(exchange, routing_key)`.
//!
//! The registry is a plain lookup table. Registration appends, resolution
//! returns the handlers bound to the exact pair in registration order, and
//! nothing is ever de-duplicated.
//!
//! Lookups dominate; registration normally happens once at startup. The table
//! sits behind a `parking_lot::RwLock` so late registration stays possible,
//! but a registration is not atomic with dispatches already in flight: those
//! keep the handler list they resolved.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::handler::{BoxedHandler, Handler, into_handler};
use courier_core::{DispatchError, DispatchResult, Route};

type RoutingTable = HashMap<String, HashMap<String, Vec<BoxedHandler>>>;

/// Maps `(exchange, routing_key)` pairs to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    /// exchange → routing key → handlers in registration order.
    routes: RwLock<RoutingTable>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Binds `handler` to `(exchange, routing_key)`.
    ///
    /// Binding the same pair again adds another handler; duplicates are
    /// invoked once each per dispatch.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidArgument`] if either part is empty.
    pub fn register<F, T>(
        &self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        handler: F,
    ) -> DispatchResult<()>
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.register_boxed(exchange, routing_key, into_handler(handler))
    }

    /// Binds a pre-built boxed handler.
    pub fn register_boxed(
        &self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        handler: BoxedHandler,
    ) -> DispatchResult<()> {
        let exchange = exchange.into();
        let routing_key = routing_key.into();

        if exchange.is_empty() {
            return Err(DispatchError::invalid_argument("exchange must not be empty"));
        }
        if routing_key.is_empty() {
            return Err(DispatchError::invalid_argument(
                "routing key must not be empty",
            ));
        }

        debug!(
            exchange = %exchange,
            routing_key = %routing_key,
            handler = handler.name(),
            "Registered handler"
        );

        self.routes
            .write()
            .entry(exchange)
            .or_default()
            .entry(routing_key)
            .or_default()
            .push(handler);

        Ok(())
    }

    /// Returns the handlers bound to the exact pair, in registration order.
    ///
    /// An unknown pair yields an empty vector.
    pub fn resolve(&self, exchange: &str, routing_key: &str) -> Vec<BoxedHandler> {
        self.routes
            .read()
            .get(exchange)
            .and_then(|keys| keys.get(routing_key))
            .cloned()
            .unwrap_or_default()
    }

    /// Removes every handler bound to the pair, returning how many were removed.
    pub fn unregister(&self, exchange: &str, routing_key: &str) -> usize {
        let mut routes = self.routes.write();

        let Some(keys) = routes.get_mut(exchange) else {
            return 0;
        };
        let removed = keys.remove(routing_key).map_or(0, |handlers| handlers.len());
        if keys.is_empty() {
            routes.remove(exchange);
        }

        if removed > 0 {
            debug!(exchange, routing_key, removed, "Unregistered handlers");
        }
        removed
    }

    /// Returns the number of handlers bound to the pair.
    pub fn handler_count(&self, exchange: &str, routing_key: &str) -> usize {
        self.routes
            .read()
            .get(exchange)
            .and_then(|keys| keys.get(routing_key))
            .map_or(0, Vec::len)
    }

    /// Returns the number of distinct bound pairs.
    pub fn route_count(&self) -> usize {
        self.routes.read().values().map(HashMap::len).sum()
    }

    /// Returns every bound pair, sorted.
    pub fn routes(&self) -> Vec<Route> {
        let routes = self.routes.read();
        let mut out: Vec<Route> = routes
            .iter()
            .flat_map(|(exchange, keys)| {
                keys.keys()
                    .map(move |routing_key| Route::new(exchange.as_str(), routing_key.as_str()))
            })
            .collect();
        out.sort();
        out
    }

    /// Removes all bindings.
    pub fn clear(&self) {
        self.routes.write().clear();
    }

    /// Returns statistics about the registry.
    pub fn stats(&self) -> RegistryStats {
        let routes = self.routes.read();
        RegistryStats {
            exchanges: routes.len(),
            routes: routes.values().map(HashMap::len).sum(),
            handlers: routes
                .values()
                .flat_map(HashMap::values)
                .map(Vec::len)
                .sum(),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about the handler registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of exchanges with at least one binding.
    pub exchanges: usize,
    /// Number of bound `(exchange, routing_key)` pairs.
    pub routes: usize,
    /// Total number of handlers across all pairs.
    pub handlers: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} handler(s) on {} route(s) across {} exchange(s)",
            self.handlers, self.routes, self.exchanges
        )
    }
}
