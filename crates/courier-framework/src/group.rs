//! Group dispatch: one message, many destinations.
//!
//! A [`KeyDeriver`] inspects the message and returns the routing keys it must
//! reach. [`GroupDispatcher::process_group`] dispatches the message once per
//! derived key and returns the responses in **derivation order**: response `i`
//! always belongs to key `i`, whatever order the dispatches finish in.
//!
//! ```text
//!                       ┌─ orders.east ─▶ Dispatcher ─▶ response[0]
//! message ─▶ deriver ───┼─ orders.west ─▶ Dispatcher ─▶ response[1]
//!                       └─ orders.east ─▶ Dispatcher ─▶ response[2]
//! ```
//!
//! Destinations run concurrently on their own tokio tasks. A deriver failure
//! aborts the call before anything is dispatched.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, warn};

use crate::dispatcher::{DispatchOptions, Dispatcher};
use courier_core::{
    ActionResponse, DeriveError, DeriveResult, DispatchError, DispatchResult, Message, Route,
    codes,
};

// ============================================================================
// KeyDeriver
// ============================================================================

/// Computes the routing keys a message must be dispatched to.
///
/// Any `Fn(&Message) -> Result<Vec<String>, E>` with `E: Into<DeriveError>`
/// is a deriver:
///
/// ```rust,ignore
/// let by_region = |msg: &Message| -> Result<Vec<String>, DeriveError> {
///     let region = msg.body_field("region").and_then(Value::as_str).ok_or("no region")?;
///     Ok(vec![format!("orders.{region}")])
/// };
/// ```
///
/// Returning duplicates is allowed; each occurrence is dispatched separately.
pub trait KeyDeriver {
    /// Returns the routing keys for `message`, in dispatch order.
    fn derive_keys(&self, message: &Message) -> DeriveResult<Vec<String>>;
}

impl<F, E> KeyDeriver for F
where
    F: Fn(&Message) -> Result<Vec<String>, E>,
    E: Into<DeriveError>,
{
    fn derive_keys(&self, message: &Message) -> DeriveResult<Vec<String>> {
        self(message).map_err(Into::into)
    }
}

/// A deriver that always yields the same keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticKeys(pub Vec<String>);

impl StaticKeys {
    /// Creates a deriver yielding `keys`.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

impl KeyDeriver for StaticKeys {
    fn derive_keys(&self, _message: &Message) -> DeriveResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Derives keys from a top-level body field.
///
/// The field may hold a string or an array of strings; each value `v` becomes
/// the key `v`, or `prefix.v` when a prefix is set.
///
/// ```rust,ignore
/// // body: { "region": ["east", "west"] }  →  ["orders.east", "orders.west"]
/// let deriver = BodyFieldDeriver::new("region").with_prefix("orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFieldDeriver {
    field: String,
    prefix: Option<String>,
}

impl BodyFieldDeriver {
    /// Creates a deriver reading `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            prefix: None,
        }
    }

    /// Prepends `prefix.` to every derived key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn key(&self, value: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}.{value}"),
            None => value.to_owned(),
        }
    }
}

impl KeyDeriver for BodyFieldDeriver {
    fn derive_keys(&self, message: &Message) -> DeriveResult<Vec<String>> {
        match message.body_field(&self.field) {
            None => Err(DeriveError::new(format!(
                "body field '{}' is missing",
                self.field
            ))),
            Some(Value::String(value)) => Ok(vec![self.key(value)]),
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| {
                    v.as_str().map(|s| self.key(s)).ok_or_else(|| {
                        DeriveError::new(format!(
                            "body field '{}' contains a non-string element",
                            self.field
                        ))
                    })
                })
                .collect(),
            Some(_) => Err(DeriveError::new(format!(
                "body field '{}' must be a string or an array of strings",
                self.field
            ))),
        }
    }
}

// ============================================================================
// GroupDispatcher
// ============================================================================

/// Fans a message out to derived routing keys and gathers the responses.
#[derive(Debug, Clone)]
pub struct GroupDispatcher {
    dispatcher: Dispatcher,
    /// Maximum dispatches in flight per group; 0 means unbounded.
    concurrency: usize,
}

impl GroupDispatcher {
    /// Creates a group dispatcher with unbounded concurrency.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            concurrency: 0,
        }
    }

    /// Limits how many destinations of one group run at once; 0 removes the limit.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// Returns the underlying single dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the concurrency limit (0 means unbounded).
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Derives the destinations for `message` without dispatching.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidArgument`] if `exchange` is empty
    /// - [`DispatchError::Derivation`] if the deriver fails
    pub fn plan<D>(&self, exchange: &str, message: &Message, deriver: &D) -> DispatchResult<Vec<Route>>
    where
        D: KeyDeriver + ?Sized,
    {
        if exchange.is_empty() {
            return Err(DispatchError::invalid_argument("exchange must not be empty"));
        }

        let keys = deriver.derive_keys(message).map_err(|e| {
            warn!(exchange, error = %e, "Routing key derivation failed");
            DispatchError::derivation(exchange, e)
        })?;

        debug!(exchange, key_count = keys.len(), "Derived routing keys");

        Ok(keys
            .into_iter()
            .map(|key| Route::new(exchange, key))
            .collect())
    }

    /// Dispatches `message` to every key derived from it.
    ///
    /// The result has one response per derived key, in derivation order.
    pub async fn process_group<D>(
        &self,
        exchange: &str,
        message: impl Into<Arc<Message>>,
        deriver: &D,
    ) -> DispatchResult<Vec<ActionResponse>>
    where
        D: KeyDeriver + ?Sized,
    {
        self.process_group_with(exchange, message, deriver, DispatchOptions::default())
            .await
    }

    /// Like [`process_group`](Self::process_group), with options applied to
    /// every destination. A deadline bounds each destination separately.
    pub async fn process_group_with<D>(
        &self,
        exchange: &str,
        message: impl Into<Arc<Message>>,
        deriver: &D,
        options: DispatchOptions,
    ) -> DispatchResult<Vec<ActionResponse>>
    where
        D: KeyDeriver + ?Sized,
    {
        let message = message.into();
        let routes = self.plan(exchange, &message, deriver)?;
        Ok(self.gather(routes, message, options).await)
    }

    /// Scatters `message` to `routes` and gathers the responses in route order.
    pub async fn gather(
        &self,
        routes: Vec<Route>,
        message: Arc<Message>,
        options: DispatchOptions,
    ) -> Vec<ActionResponse> {
        if routes.is_empty() {
            return Vec::new();
        }

        let slots = routes.len();
        let limit = match self.concurrency {
            0 => slots,
            n => n,
        };
        let span = debug_span!("group_dispatch", slots, limit);

        // Slots finish in any order; the index puts each response back in place.
        let mut finished = stream::iter(routes.into_iter().enumerate())
            .map(|(index, route)| {
                let dispatcher = self.dispatcher.clone();
                let message = Arc::clone(&message);
                async move {
                    let slot_route = route.clone();
                    let handle = tokio::spawn(
                        async move { dispatcher.dispatch(route, message, options).await }
                            .in_current_span(),
                    );
                    let response = match handle.await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!(route = %slot_route, error = %e, "Dispatch task did not complete");
                            ActionResponse::system_error(format!(
                                "dispatch task for {slot_route} did not complete: {e}"
                            ))
                            .with_code(codes::TASK_ABORTED)
                        }
                    };
                    (index, response)
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .instrument(span)
            .await;

        finished.sort_unstable_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, response)| response).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use courier_core::ActionStatus;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn group(registry: HandlerRegistry) -> GroupDispatcher {
        GroupDispatcher::new(Dispatcher::new(Arc::new(registry)))
    }

    fn echo_key(registry: &HandlerRegistry, key: &str, delay_ms: u64) {
        registry
            .register("orders", key, move |route: Route| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                json!(route.routing_key)
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_keys_yield_empty_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let registry = HandlerRegistry::new();
        registry
            .register("orders", "east", move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        let responses = group(registry)
            .process_group("orders", Message::default(), &StaticKeys::default())
            .await
            .unwrap();

        assert!(responses.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_derivation_not_completion() {
        let registry = HandlerRegistry::new();
        echo_key(&registry, "slow", 300);
        echo_key(&registry, "fast", 10);
        echo_key(&registry, "mid", 100);

        let responses = group(registry)
            .process_group(
                "orders",
                Message::default(),
                &StaticKeys::new(["slow", "fast", "mid"]),
            )
            .await
            .unwrap();

        let keys: Vec<_> = responses.iter().map(|r| r.data.clone().unwrap()).collect();
        assert_eq!(keys, vec![json!("slow"), json!("fast"), json!("mid")]);
    }

    #[tokio::test]
    async fn test_duplicates_dispatched_independently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let registry = HandlerRegistry::new();
        registry
            .register("orders", "a", move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        echo_key(&registry, "b", 0);

        let responses = group(registry)
            .process_group("orders", Message::default(), &StaticKeys::new(["a", "a", "b"]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(responses[2].data, Some(json!("b")));
    }

    #[tokio::test]
    async fn test_region_scenario_partial_failure() {
        let registry = HandlerRegistry::new();
        registry
            .register("orders", "orders.east", || async {
                json!({ "accepted": true })
            })
            .unwrap();

        let message = Message::new(json!({ "region": ["east", "west"] }));
        let deriver = BodyFieldDeriver::new("region").with_prefix("orders");

        let responses = group(registry)
            .process_group("orders", message, &deriver)
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].status, ActionStatus::Success);
        assert_eq!(responses[1].status, ActionStatus::BusinessFailure);
        assert_eq!(responses[1].code(), Some(codes::NO_HANDLER));
    }

    #[tokio::test]
    async fn test_derivation_failure_is_hard_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let registry = HandlerRegistry::new();
        registry
            .register("orders", "east", move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        let failing = |_: &Message| -> Result<Vec<String>, &'static str> { Err("no region") };
        let err = group(registry)
            .process_group("orders", Message::default(), &failing)
            .await
            .unwrap_err();

        match err {
            DispatchError::Derivation { exchange, source } => {
                assert_eq!(exchange, "orders");
                assert_eq!(source.reason(), "no region");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_exchange_rejected() {
        let err = group(HandlerRegistry::new())
            .process_group("", Message::default(), &StaticKeys::new(["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_affects_its_slot() {
        let registry = HandlerRegistry::new();
        echo_key(&registry, "fast", 10);
        echo_key(&registry, "stuck", 60_000);

        let responses = group(registry)
            .process_group_with(
                "orders",
                Message::default(),
                &StaticKeys::new(["fast", "stuck", "fast"]),
                DispatchOptions::new().deadline(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(responses[0].data, Some(json!("fast")));
        assert_eq!(responses[1].code(), Some(codes::DEADLINE_EXCEEDED));
        assert_eq!(responses[2].data, Some(json!("fast")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let registry = HandlerRegistry::new();
        let (f, p) = (Arc::clone(&in_flight), Arc::clone(&peak));
        registry
            .register("orders", "job", move |route: Route| {
                let (f, p) = (Arc::clone(&f), Arc::clone(&p));
                async move {
                    let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    f.fetch_sub(1, Ordering::SeqCst);
                    json!(route.routing_key)
                }
            })
            .unwrap();

        let responses = group(registry)
            .with_concurrency(2)
            .process_group("orders", Message::default(), &StaticKeys::new(["job"; 6]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 6);
        assert!(responses.iter().all(|r| r.is_success()));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_slots_run_concurrently() {
        let registry = HandlerRegistry::new();
        echo_key(&registry, "a", 100);
        echo_key(&registry, "b", 100);
        echo_key(&registry, "c", 100);

        let started = tokio::time::Instant::now();
        let responses = group(registry)
            .process_group("orders", Message::default(), &StaticKeys::new(["a", "b", "c"]))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(responses.len(), 3);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_slot_does_not_hold_back_limited_group() {
        let registry = HandlerRegistry::new();
        echo_key(&registry, "slow", 300);
        echo_key(&registry, "fast", 10);

        let started = tokio::time::Instant::now();
        let responses = group(registry)
            .with_concurrency(2)
            .process_group(
                "orders",
                Message::default(),
                &StaticKeys::new(["slow", "fast", "fast", "fast"]),
            )
            .await
            .unwrap();
        let elapsed = started.elapsed();

        let keys: Vec<_> = responses.iter().map(|r| r.data.clone().unwrap()).collect();
        assert_eq!(
            keys,
            vec![json!("slow"), json!("fast"), json!("fast"), json!("fast")]
        );
        assert!(elapsed < Duration::from_millis(305), "took {elapsed:?}");
    }

    #[test]
    fn test_plan_routes() {
        let deriver = |msg: &Message| -> Result<Vec<String>, DeriveError> {
            Ok(vec![msg.request_type.clone(), "audit".to_owned()])
        };
        let routes = group(HandlerRegistry::new())
            .plan(
                "billing",
                &Message::default().with_request_type("charge"),
                &deriver,
            )
            .unwrap();

        assert_eq!(
            routes,
            vec![Route::new("billing", "charge"), Route::new("billing", "audit")]
        );
    }

    #[test]
    fn test_body_field_deriver() {
        let deriver = BodyFieldDeriver::new("region");

        let single = Message::new(json!({ "region": "east" }));
        assert_eq!(deriver.derive_keys(&single).unwrap(), vec!["east"]);

        let missing = Message::new(json!({}));
        assert!(deriver.derive_keys(&missing).is_err());

        let mixed = Message::new(json!({ "region": ["east", 5] }));
        assert!(deriver.derive_keys(&mixed).is_err());

        let wrong_type = Message::new(json!({ "region": 5 }));
        assert!(deriver.derive_keys(&wrong_type).is_err());

        let empty = Message::new(json!({ "region": [] }));
        assert!(deriver.derive_keys(&empty).unwrap().is_empty());
    }
}
