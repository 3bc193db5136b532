//! Result channels for deferred dispatch.
//!
//! A deferred dispatch returns a [`CorrelationToken`] immediately; when the
//! dispatch finishes its [`ActionResponse`] is published to a
//! [`ResultChannel`] under that token. In production the channel is owned by
//! the transport (a reply queue, a cache, ...). [`InMemoryResultChannel`]
//! covers single-process use and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use courier_core::{ActionResponse, CorrelationToken, DispatchError, DispatchResult};

/// Out-of-band delivery of deferred results keyed by correlation token.
#[async_trait]
pub trait ResultChannel: Send + Sync {
    /// Makes `response` retrievable under `token`.
    async fn publish(&self, token: &CorrelationToken, response: ActionResponse);

    /// Waits for the response published under `token`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::ChannelClosed`] if the result can no longer arrive.
    async fn subscribe(&self, token: &CorrelationToken) -> DispatchResult<ActionResponse>;
}

// =============================================================================
// InMemoryResultChannel
// =============================================================================

enum Slot {
    /// Published, not yet collected.
    Ready(ActionResponse),
    /// Subscribers waiting for a publish.
    Waiting(Vec<oneshot::Sender<ActionResponse>>),
}

/// Process-local result store.
///
/// Publish and subscribe may happen in either order. A result is handed to
/// every subscriber waiting at publish time, or else kept until the first
/// subscriber collects it; either way it is removed once delivered.
#[derive(Default)]
pub struct InMemoryResultChannel {
    slots: Mutex<HashMap<CorrelationToken, Slot>>,
}

impl InMemoryResultChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published results not yet collected.
    pub fn ready_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Number of tokens with subscribers still waiting.
    pub fn waiting_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Waiting(_)))
            .count()
    }

    /// Takes a published result without waiting.
    pub fn try_take(&self, token: &CorrelationToken) -> Option<ActionResponse> {
        let mut slots = self.slots.lock();
        match slots.remove(token) {
            Some(Slot::Ready(response)) => Some(response),
            Some(waiting) => {
                slots.insert(token.clone(), waiting);
                None
            }
            None => None,
        }
    }

    /// Forgets `token`. Waiting subscribers fail with `ChannelClosed`.
    pub fn discard(&self, token: &CorrelationToken) -> bool {
        self.slots.lock().remove(token).is_some()
    }

    /// Drops subscribers that stopped waiting, and the slot once none remain.
    fn prune(&self, token: &CorrelationToken) {
        let mut slots = self.slots.lock();
        if let Some(Slot::Waiting(waiters)) = slots.get_mut(token) {
            waiters.retain(|tx| !tx.is_closed());
            if waiters.is_empty() {
                trace!(token = %token, "Last subscriber gone, slot released");
                slots.remove(token);
            }
        }
    }
}

/// A registered subscriber. Dropping it before the result arrives
/// unregisters it from the slot.
struct Subscription<'a> {
    channel: &'a InMemoryResultChannel,
    token: &'a CorrelationToken,
    rx: Option<oneshot::Receiver<ActionResponse>>,
}

impl Subscription<'_> {
    async fn recv(&mut self) -> DispatchResult<ActionResponse> {
        let token = self.token;
        let closed = || DispatchError::ChannelClosed {
            token: token.clone(),
        };
        match self.rx.as_mut() {
            Some(rx) => rx.await.map_err(|_| closed()),
            None => Err(closed()),
        }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        // The receiver must be gone before pruning so its sender reads as closed.
        drop(self.rx.take());
        self.channel.prune(self.token);
    }
}

#[async_trait]
impl ResultChannel for InMemoryResultChannel {
    async fn publish(&self, token: &CorrelationToken, response: ActionResponse) {
        let waiters = {
            let mut slots = self.slots.lock();
            match slots.remove(token) {
                Some(Slot::Waiting(waiters)) => waiters,
                Some(Slot::Ready(_)) => {
                    warn!(token = %token, "Result published twice, keeping the latest");
                    slots.insert(token.clone(), Slot::Ready(response));
                    return;
                }
                None => {
                    trace!(token = %token, "Result stored until collected");
                    slots.insert(token.clone(), Slot::Ready(response));
                    return;
                }
            }
        };

        let mut delivered = 0usize;
        for waiter in waiters {
            if waiter.send(response.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            // Every subscriber went away; keep the result for a later one.
            self.slots
                .lock()
                .insert(token.clone(), Slot::Ready(response));
        } else {
            debug!(token = %token, subscribers = delivered, "Result delivered");
        }
    }

    async fn subscribe(&self, token: &CorrelationToken) -> DispatchResult<ActionResponse> {
        let rx = {
            let mut slots = self.slots.lock();
            let (tx, rx) = oneshot::channel();
            match slots.remove(token) {
                Some(Slot::Ready(response)) => return Ok(response),
                Some(Slot::Waiting(mut waiters)) => {
                    waiters.retain(|tx| !tx.is_closed());
                    waiters.push(tx);
                    slots.insert(token.clone(), Slot::Waiting(waiters));
                }
                None => {
                    slots.insert(token.clone(), Slot::Waiting(vec![tx]));
                }
            }
            rx
        };

        let mut subscription = Subscription {
            channel: self,
            token,
            rx: Some(rx),
        };
        subscription.recv().await
    }
}

impl std::fmt::Debug for InMemoryResultChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResultChannel")
            .field("ready", &self.ready_count())
            .field("waiting", &self.waiting_count())
            .finish()
    }
}

// =============================================================================
// DiscardResultChannel
// =============================================================================

/// Drops every result. For pure fire-and-forget traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardResultChannel;

#[async_trait]
impl ResultChannel for DiscardResultChannel {
    async fn publish(&self, token: &CorrelationToken, response: ActionResponse) {
        trace!(token = %token, status = %response.status, "Discarding deferred result");
    }

    async fn subscribe(&self, token: &CorrelationToken) -> DispatchResult<ActionResponse> {
        Err(DispatchError::ChannelClosed {
            token: token.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_then_subscribe() {
        let channel = InMemoryResultChannel::new();
        let token = CorrelationToken::new("t-1");

        channel.publish(&token, ActionResponse::success()).await;
        assert_eq!(channel.ready_count(), 1);

        let response = channel.subscribe(&token).await.unwrap();
        assert!(response.is_success());
        assert_eq!(channel.ready_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_then_publish() {
        let channel = Arc::new(InMemoryResultChannel::new());
        let token = CorrelationToken::new("t-2");

        let waiter = {
            let channel = Arc::clone(&channel);
            let token = token.clone();
            tokio::spawn(async move { channel.subscribe(&token).await })
        };

        while channel.waiting_count() == 0 {
            tokio::task::yield_now().await;
        }
        channel
            .publish(&token, ActionResponse::system_error("late"))
            .await;

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.message.as_deref(), Some("late"));
        assert_eq!(channel.waiting_count(), 0);
        assert_eq!(channel.ready_count(), 0);
    }

    #[tokio::test]
    async fn test_discard_fails_waiting_subscriber() {
        let channel = Arc::new(InMemoryResultChannel::new());
        let token = CorrelationToken::new("t-3");

        let waiter = {
            let channel = Arc::clone(&channel);
            let token = token.clone();
            tokio::spawn(async move { channel.subscribe(&token).await })
        };

        while channel.waiting_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(channel.discard(&token));

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(DispatchError::ChannelClosed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_subscriber_releases_slot() {
        let channel = InMemoryResultChannel::new();
        let token = CorrelationToken::new("t-6");

        let result = tokio::time::timeout(Duration::from_millis(50), channel.subscribe(&token)).await;
        assert!(result.is_err());
        assert_eq!(channel.waiting_count(), 0);

        // A late publish is kept for the next subscriber.
        channel.publish(&token, ActionResponse::success()).await;
        assert!(channel.subscribe(&token).await.unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscriber_leaves_others_waiting() {
        let channel = Arc::new(InMemoryResultChannel::new());
        let token = CorrelationToken::new("t-7");

        let patient = {
            let channel = Arc::clone(&channel);
            let token = token.clone();
            tokio::spawn(async move { channel.subscribe(&token).await })
        };
        while channel.waiting_count() == 0 {
            tokio::task::yield_now().await;
        }

        let impatient =
            tokio::time::timeout(Duration::from_millis(50), channel.subscribe(&token)).await;
        assert!(impatient.is_err());
        assert_eq!(channel.waiting_count(), 1);

        channel.publish(&token, ActionResponse::success()).await;
        assert!(patient.await.unwrap().unwrap().is_success());
        assert_eq!(channel.waiting_count(), 0);
        assert_eq!(channel.ready_count(), 0);
    }

    #[tokio::test]
    async fn test_try_take() {
        let channel = InMemoryResultChannel::new();
        let token = CorrelationToken::new("t-4");

        assert!(channel.try_take(&token).is_none());
        channel.publish(&token, ActionResponse::success()).await;
        assert!(channel.try_take(&token).is_some());
        assert!(channel.try_take(&token).is_none());
    }

    #[tokio::test]
    async fn test_discard_channel() {
        let channel = DiscardResultChannel;
        let token = CorrelationToken::new("t-5");
        channel.publish(&token, ActionResponse::success()).await;
        assert!(channel.subscribe(&token).await.is_err());
    }
}
