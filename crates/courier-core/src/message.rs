//! Inbound message model.
//!
//! A [`Message`] is created by the transport collaborator and handed to the
//! dispatcher. Once dispatched it is shared as `Arc<Message>` and never
//! mutated; the `body` is an opaque JSON payload interpreted only by handlers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::route::Route;

/// A single inbound message.
///
/// # Example
///
/// ```rust
/// use courier_core::Message;
/// use serde_json::json;
///
/// let msg = Message::new(json!({ "orderId": 42 }))
///     .with_customer_id(7)
///     .with_request_type("order.create");
///
/// assert_eq!(msg.body_field("orderId"), Some(&json!(42)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Numeric message type as assigned by the producer.
    #[serde(default)]
    pub message_type: i32,
    /// Customer (tenant) the message belongs to.
    #[serde(default)]
    pub customer_id: i64,
    /// Free-form request type.
    #[serde(default)]
    pub request_type: String,
    /// Free-form request key.
    #[serde(default)]
    pub request_key: String,
    /// Originating user id.
    #[serde(default)]
    pub user_id: i64,
    /// Originating user name.
    #[serde(default)]
    pub user_name: String,
    /// Opaque payload.
    #[serde(default)]
    pub body: Value,
}

impl Message {
    /// Creates a message carrying `body` with all header fields zeroed.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// Sets the message type.
    pub fn with_message_type(mut self, message_type: i32) -> Self {
        self.message_type = message_type;
        self
    }

    /// Sets the customer id.
    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = customer_id;
        self
    }

    /// Sets the request type.
    pub fn with_request_type(mut self, request_type: impl Into<String>) -> Self {
        self.request_type = request_type.into();
        self
    }

    /// Sets the request key.
    pub fn with_request_key(mut self, request_key: impl Into<String>) -> Self {
        self.request_key = request_key.into();
        self
    }

    /// Sets the originating user.
    pub fn with_user(mut self, user_id: i64, user_name: impl Into<String>) -> Self {
        self.user_id = user_id;
        self.user_name = user_name.into();
        self
    }

    /// Deserializes the body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    /// Returns a top-level field of an object body, if present.
    pub fn body_field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// One delivered message together with its destination.
///
/// This is the tuple the transport collaborator passes across the inbound
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key within the exchange.
    pub routing_key: String,
    /// The message itself.
    pub message: Message,
}

impl Delivery {
    /// Creates a delivery.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: Message,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message,
        }
    }

    /// Returns the destination of this delivery.
    pub fn route(&self) -> Route {
        Route::new(self.exchange.as_str(), self.routing_key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Order {
        order_id: u64,
    }

    #[test]
    fn test_body_as_typed() {
        let msg = Message::new(json!({ "orderId": 42 }));
        let order: Order = msg.body_as().unwrap();
        assert_eq!(order, Order { order_id: 42 });
    }

    #[test]
    fn test_body_as_mismatch() {
        let msg = Message::new(json!("not an object"));
        assert!(msg.body_as::<Order>().is_err());
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let msg: Message = serde_json::from_value(json!({
            "customerId": 3,
            "userName": "alice",
            "body": { "region": "east" }
        }))
        .unwrap();

        assert_eq!(msg.customer_id, 3);
        assert_eq!(msg.user_name, "alice");
        assert_eq!(msg.message_type, 0);
        assert_eq!(msg.body_field("region"), Some(&json!("east")));
    }

    #[test]
    fn test_delivery_route() {
        let delivery = Delivery::new("orders", "created", Message::default());
        assert_eq!(delivery.route(), Route::new("orders", "created"));
    }
}
