//! Deferred (fire-and-forget) dispatch.
//!
//! [`AsyncDispatcher`] schedules a dispatch on the tokio runtime and hands
//! back a [`CorrelationToken`] straight away. When the dispatch finishes its
//! response is published to the configured [`ResultChannel`] under that
//! token, so a caller on the other side of a transport can collect it later.
//!
//! ```rust,ignore
//! let channel = Arc::new(InMemoryResultChannel::new());
//! let deferred = AsyncDispatcher::new(group, channel.clone())?;
//!
//! let token = deferred.process_async("orders", "created", message);
//! // ... later, possibly elsewhere
//! let response = channel.subscribe(&token).await?;
//! ```
//!
//! Tokens are unique per scheduled dispatch. A group call issues one token
//! per derived key, in derivation order.

use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, warn};

use crate::channel::ResultChannel;
use crate::dispatcher::DispatchOptions;
use crate::group::{GroupDispatcher, KeyDeriver};
use courier_core::{
    ActionResponse, CorrelationToken, DispatchError, DispatchResult, Message, Route,
    TokenIssuer, UlidTokenIssuer, codes,
};

/// A scheduled dispatch that can still be awaited in-process.
///
/// Dropping it detaches the task; the result still reaches the channel.
#[derive(Debug)]
pub struct PendingDispatch {
    token: CorrelationToken,
    handle: JoinHandle<ActionResponse>,
}

impl PendingDispatch {
    /// The token the result is published under.
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// Detaches the task and keeps only the token.
    pub fn into_token(self) -> CorrelationToken {
        self.token
    }

    /// Returns `true` once the dispatch has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the dispatch. Subscribers receive a `TASK_ABORTED` system error.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the response in-process.
    pub async fn wait(self) -> ActionResponse {
        match self.handle.await {
            Ok(response) => response,
            Err(e) => ActionResponse::system_error(format!(
                "deferred dispatch {} did not complete: {e}",
                self.token
            ))
            .with_code(codes::TASK_ABORTED),
        }
    }
}

/// Schedules dispatches and reports results through a [`ResultChannel`].
#[derive(Clone)]
pub struct AsyncDispatcher {
    group: GroupDispatcher,
    issuer: Arc<dyn TokenIssuer>,
    channel: Arc<dyn ResultChannel>,
    runtime: Handle,
}

impl AsyncDispatcher {
    /// Creates a facade bound to the current tokio runtime, issuing ULID tokens.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(group: GroupDispatcher, channel: Arc<dyn ResultChannel>) -> DispatchResult<Self> {
        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        Ok(Self::with_runtime(group, channel, runtime))
    }

    /// Creates a facade that schedules onto `runtime`.
    pub fn with_runtime(
        group: GroupDispatcher,
        channel: Arc<dyn ResultChannel>,
        runtime: Handle,
    ) -> Self {
        Self {
            group,
            issuer: Arc::new(UlidTokenIssuer::new()),
            channel,
            runtime,
        }
    }

    /// Replaces the token issuer.
    pub fn with_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Returns the channel results are published to.
    pub fn channel(&self) -> &Arc<dyn ResultChannel> {
        &self.channel
    }

    /// Returns the group dispatcher used for scheduling.
    pub fn group(&self) -> &GroupDispatcher {
        &self.group
    }

    /// Schedules a single dispatch and returns its token immediately.
    pub fn process_async(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
    ) -> CorrelationToken {
        self.spawn(exchange, routing_key, message).into_token()
    }

    /// Schedules a single dispatch, keeping a handle to it.
    pub fn spawn(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
    ) -> PendingDispatch {
        self.spawn_with(exchange, routing_key, message, DispatchOptions::default())
    }

    /// Like [`spawn`](Self::spawn), with explicit options.
    pub fn spawn_with(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
        options: DispatchOptions,
    ) -> PendingDispatch {
        self.schedule(Route::new(exchange, routing_key), message.into(), options)
    }

    /// Schedules one dispatch per derived key and returns their tokens.
    ///
    /// Keys are derived before this returns, so a deriver failure is reported
    /// here and nothing is scheduled.
    ///
    /// # Errors
    ///
    /// Same as [`GroupDispatcher::plan`].
    pub fn process_group_async<D>(
        &self,
        exchange: &str,
        message: impl Into<Arc<Message>>,
        deriver: &D,
    ) -> DispatchResult<Vec<CorrelationToken>>
    where
        D: KeyDeriver + ?Sized,
    {
        Ok(self
            .spawn_group(exchange, message, deriver, DispatchOptions::default())?
            .into_iter()
            .map(PendingDispatch::into_token)
            .collect())
    }

    /// Schedules one dispatch per derived key, keeping handles in derivation order.
    pub fn spawn_group<D>(
        &self,
        exchange: &str,
        message: impl Into<Arc<Message>>,
        deriver: &D,
        options: DispatchOptions,
    ) -> DispatchResult<Vec<PendingDispatch>>
    where
        D: KeyDeriver + ?Sized,
    {
        let message = message.into();
        let routes = self.group.plan(exchange, &message, deriver)?;

        Ok(routes
            .into_iter()
            .map(|route| self.schedule(route, Arc::clone(&message), options))
            .collect())
    }

    fn schedule(
        &self,
        route: Route,
        message: Arc<Message>,
        options: DispatchOptions,
    ) -> PendingDispatch {
        let token = self.issuer.issue();
        debug!(token = %token, route = %route, "Scheduling deferred dispatch");

        let dispatcher = self.group.dispatcher().clone();
        let channel = Arc::clone(&self.channel);
        let task_token = token.clone();
        let span = debug_span!("deferred_dispatch", token = %token);
        // Built outside the task so it fires even if the task never gets polled.
        let guard = CancelGuard {
            armed: true,
            token: token.clone(),
            channel: Arc::clone(&self.channel),
            runtime: self.runtime.clone(),
        };

        let handle = self.runtime.spawn(
            async move {
                let mut guard = guard;
                let response = dispatcher.dispatch(route, message, options).await;
                guard.armed = false;
                if !response.is_success() {
                    warn!(status = %response.status, "Deferred dispatch failed");
                }
                channel.publish(&task_token, response.clone()).await;
                response
            }
            .instrument(span),
        );

        PendingDispatch { token, handle }
    }
}

/// Publishes `TASK_ABORTED` for a dispatch task dropped before it produced a
/// response (aborted, or torn down with the runtime).
struct CancelGuard {
    armed: bool,
    token: CorrelationToken,
    channel: Arc<dyn ResultChannel>,
    runtime: Handle,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(token = %self.token, "Deferred dispatch cancelled");
        let response = ActionResponse::system_error(format!(
            "deferred dispatch {} was cancelled",
            self.token
        ))
        .with_code(codes::TASK_ABORTED);

        let channel = Arc::clone(&self.channel);
        let token = self.token.clone();
        let mut publish = Box::pin(async move { channel.publish(&token, response).await });

        // Channels that never suspend finish here, which also covers a runtime
        // that is shutting down; anything else is finished on the runtime.
        if (&mut publish).now_or_never().is_none() {
            self.runtime.spawn(publish);
        }
    }
}

impl std::fmt::Debug for AsyncDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncDispatcher")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}
