//! Two-part destination identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An `(exchange, routing_key)` pair.
///
/// Both parts are opaque strings compared for exact equality. There is no
/// wildcard or pattern matching at this level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Logical namespace the routing key is scoped under.
    pub exchange: String,
    /// Discriminator within the exchange.
    pub routing_key: String,
}

impl Route {
    /// Creates a route.
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Returns the exchange.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Returns the routing key.
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange, self.routing_key)
    }
}
