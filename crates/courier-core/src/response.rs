//! Dispatch outcomes.
//!
//! Every dispatch attempt produces exactly one [`ActionResponse`]. Failures of
//! a single destination (no handler, handler fault, deadline overrun) are
//! represented here rather than as Rust errors, so that a group dispatch can
//! report them per slot.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::route::Route;

/// Well-known response codes produced by the dispatch core.
pub mod codes {
    /// No handler is registered for the destination.
    pub const NO_HANDLER: &str = "NO_HANDLER";
    /// A handler returned an error.
    pub const HANDLER_FAULT: &str = "HANDLER_FAULT";
    /// A handler panicked.
    pub const HANDLER_PANIC: &str = "HANDLER_PANIC";
    /// The dispatch did not finish before its deadline.
    pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
    /// The message could not be converted into the handler's parameters.
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    /// The task running the dispatch was cancelled before it completed.
    pub const TASK_ABORTED: &str = "TASK_ABORTED";
}

/// High-level outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    /// The handler completed successfully.
    Success,
    /// The request was understood but rejected on business grounds.
    BusinessFailure,
    /// The handler faulted or the dispatch could not complete.
    SystemError,
}

impl ActionStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::BusinessFailure => "business_failure",
            Self::SystemError => "system_error",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Outcome classification.
    pub status: ActionStatus,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Opaque result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResponse {
    /// A success without payload.
    pub fn success() -> Self {
        Self {
            status: ActionStatus::Success,
            code: None,
            message: None,
            data: None,
        }
    }

    /// A success carrying `data`.
    pub fn success_with(data: Value) -> Self {
        Self::success().with_data(data)
    }

    /// A business failure with the given code and description.
    pub fn business_failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::BusinessFailure,
            code: Some(code.into()),
            message: Some(message.into()),
            data: None,
        }
    }

    /// A system error with the given fault description.
    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::SystemError,
            code: None,
            message: Some(message.into()),
            data: None,
        }
    }

    /// The business failure reported when nothing is bound to `route`.
    pub fn no_handler(route: &Route) -> Self {
        Self::business_failure(codes::NO_HANDLER, format!("no handler for {route}"))
    }

    /// The system error reported when a dispatch to `route` overruns `deadline`.
    pub fn deadline_exceeded(route: &Route, deadline: Duration) -> Self {
        Self::system_error(format!(
            "dispatch to {route} exceeded deadline of {}ms",
            deadline.as_millis()
        ))
        .with_code(codes::DEADLINE_EXCEEDED)
    }

    /// Replaces the code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Replaces the description.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replaces the payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns `true` for [`ActionStatus::Success`].
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    /// Returns `true` for either failure status.
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Returns the code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl Default for ActionResponse {
    fn default() -> Self {
        Self::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_handler_is_business_failure() {
        let resp = ActionResponse::no_handler(&Route::new("orders", "west"));
        assert_eq!(resp.status, ActionStatus::BusinessFailure);
        assert_eq!(resp.code(), Some(codes::NO_HANDLER));
        assert_eq!(resp.message.as_deref(), Some("no handler for orders/west"));
    }

    #[test]
    fn test_deadline_exceeded_is_system_error() {
        let resp =
            ActionResponse::deadline_exceeded(&Route::new("a", "b"), Duration::from_millis(250));
        assert_eq!(resp.status, ActionStatus::SystemError);
        assert_eq!(resp.code(), Some(codes::DEADLINE_EXCEEDED));
        assert!(resp.message.unwrap().contains("250ms"));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let value = serde_json::to_value(ActionResponse::success_with(json!({ "orderId": 42 })))
            .unwrap();
        assert_eq!(
            value,
            json!({ "status": "Success", "data": { "orderId": 42 } })
        );
    }
}
