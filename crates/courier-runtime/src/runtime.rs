//! The composition root.
//!
//! [`CourierRuntime`] owns one handler registry and the three dispatch
//! surfaces built over it (single, group, deferred), configured from a
//! [`CourierConfig`].
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .config_file("config/courier.toml")
//!     .profile("production")
//!     .build()?;
//!
//! runtime.register("orders", "created", create_order)?;
//! let response = runtime.process("orders", "created", message).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::config::{ConfigLoader, CourierConfig, TokenConfig, TokenKind};
use crate::error::RuntimeResult;
use crate::logging;
use courier_core::{
    ActionResponse, CorrelationToken, Delivery, DispatchResult, Message, SequenceTokenIssuer,
    TokenIssuer, UlidTokenIssuer,
};
use courier_framework::{
    AsyncDispatcher, DispatchOptions, Dispatcher, GroupDispatcher, Handler, HandlerRegistry,
    InMemoryResultChannel, KeyDeriver, RegistryStats, ResultChannel,
};

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    groups: AtomicU64,
    deferred: AtomicU64,
}

/// Registry plus dispatchers, wired from configuration.
///
/// Cloning is cheap; clones share handlers, the result channel and counters.
#[derive(Clone)]
pub struct CourierRuntime {
    config: Arc<CourierConfig>,
    registry: Arc<HandlerRegistry>,
    group: GroupDispatcher,
    deferred: AsyncDispatcher,
    channel: Arc<dyn ResultChannel>,
    counters: Arc<Counters>,
}

impl CourierRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration with an in-memory result channel.
    ///
    /// Initialises logging unless `logging.enabled` is false.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime.
    pub fn from_config(config: &CourierConfig) -> RuntimeResult<Self> {
        Self::from_parts(config, Arc::new(InMemoryResultChannel::new()), None)
    }

    fn from_parts(
        config: &CourierConfig,
        channel: Arc<dyn ResultChannel>,
        issuer: Option<Arc<dyn TokenIssuer>>,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry))
            .with_default_deadline(config.dispatch.default_deadline());
        let group = GroupDispatcher::new(dispatcher).with_concurrency(config.dispatch.group_concurrency);
        let issuer = issuer.unwrap_or_else(|| build_issuer(&config.dispatch.tokens));
        let deferred = AsyncDispatcher::new(group.clone(), Arc::clone(&channel))?.with_issuer(issuer);

        info!(
            default_deadline_ms = ?config.dispatch.default_deadline_ms,
            group_concurrency = config.dispatch.group_concurrency,
            tokens = ?config.dispatch.tokens.kind,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            registry,
            group,
            deferred,
            channel,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Returns the configuration the runtime was built from.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Returns the handler registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Returns the single dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.group.dispatcher()
    }

    /// Returns the group dispatcher.
    pub fn group(&self) -> &GroupDispatcher {
        &self.group
    }

    /// Returns the deferred dispatch facade.
    pub fn deferred(&self) -> &AsyncDispatcher {
        &self.deferred
    }

    /// Returns the channel deferred results are published to.
    pub fn result_channel(&self) -> &Arc<dyn ResultChannel> {
        &self.channel
    }

    /// Binds `handler` to `(exchange, routing_key)`.
    pub fn register<F, T>(
        &self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        handler: F,
    ) -> RuntimeResult<()>
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.registry.register(exchange, routing_key, handler)?;
        Ok(())
    }

    /// Dispatches to one destination.
    pub async fn process(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
    ) -> ActionResponse {
        self.process_with(exchange, routing_key, message, DispatchOptions::default())
            .await
    }

    /// Dispatches to one destination with explicit options.
    pub async fn process_with(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
        options: DispatchOptions,
    ) -> ActionResponse {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        self.dispatcher()
            .process_with(exchange, routing_key, message, options)
            .await
    }

    /// Dispatches a transport delivery to the route it names.
    pub async fn deliver(&self, delivery: Delivery) -> ActionResponse {
        let route = delivery.route();
        debug!(route = %route, "Delivery received");

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        self.dispatcher()
            .dispatch(route, Arc::new(delivery.message), DispatchOptions::default())
            .await
    }

    /// Dispatches to every derived key; responses are in derivation order.
    pub async fn process_group<D>(
        &self,
        exchange: &str,
        message: impl Into<Arc<Message>>,
        deriver: &D,
    ) -> DispatchResult<Vec<ActionResponse>>
    where
        D: KeyDeriver + ?Sized,
    {
        self.counters.groups.fetch_add(1, Ordering::Relaxed);
        self.group.process_group(exchange, message, deriver).await
    }

    /// Schedules one dispatch and returns its correlation token.
    pub fn process_async(
        &self,
        exchange: &str,
        routing_key: &str,
        message: impl Into<Arc<Message>>,
    ) -> CorrelationToken {
        self.counters.deferred.fetch_add(1, Ordering::Relaxed);
        self.deferred.process_async(exchange, routing_key, message)
    }

    /// Schedules one dispatch per derived key; tokens are in derivation order.
    pub fn process_group_async<D>(
        &self,
        exchange: &str,
        message: impl Into<Arc<Message>>,
        deriver: &D,
    ) -> DispatchResult<Vec<CorrelationToken>>
    where
        D: KeyDeriver + ?Sized,
    {
        let tokens = self.deferred.process_group_async(exchange, message, deriver)?;
        self.counters
            .deferred
            .fetch_add(tokens.len() as u64, Ordering::Relaxed);
        Ok(tokens)
    }

    /// Waits for a deferred result on the runtime's channel.
    pub async fn collect(&self, token: &CorrelationToken) -> DispatchResult<ActionResponse> {
        self.channel.subscribe(token).await
    }

    /// Returns registry and traffic statistics.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            registry: self.registry.stats(),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            groups: self.counters.groups.load(Ordering::Relaxed),
            deferred: self.counters.deferred.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CourierRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierRuntime")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn build_issuer(tokens: &TokenConfig) -> Arc<dyn TokenIssuer> {
    match tokens.kind {
        TokenKind::Ulid => Arc::new(UlidTokenIssuer::new()),
        TokenKind::Sequence => Arc::new(SequenceTokenIssuer::new(tokens.prefix.clone())),
    }
}

/// Runtime statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub registry: RegistryStats,
    /// Single dispatches, including deliveries.
    pub dispatched: u64,
    /// Group dispatch calls.
    pub groups: u64,
    /// Deferred dispatches scheduled.
    pub deferred: u64,
}

impl std::fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}; {} dispatch(es), {} group(s), {} deferred",
            self.registry, self.dispatched, self.groups, self.deferred
        )
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`CourierRuntime`].
///
/// ```rust,ignore
/// let runtime = CourierRuntime::builder()
///     .without_env()
///     .result_channel(Arc::new(MyReplyQueue::connect(url)?))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<CourierConfig>,
    channel: Option<Arc<dyn ResultChannel>>,
    issuer: Option<Arc<dyn TokenIssuer>>,
}

impl RuntimeBuilder {
    /// Creates a builder that loads configuration from the default locations.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            channel: None,
            issuer: None,
        }
    }

    /// Uses `config` as-is instead of loading.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration over every loaded source.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Publishes deferred results to `channel` instead of an in-memory store.
    pub fn result_channel(mut self, channel: Arc<dyn ResultChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Overrides the token issuer chosen by configuration.
    pub fn token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Builds the runtime.
    ///
    /// # Errors
    ///
    /// Configuration failures, or being called outside a tokio runtime.
    pub fn build(self) -> RuntimeResult<CourierRuntime> {
        let config = match self.config {
            Some(config) => {
                crate::config::validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };
        let channel = self
            .channel
            .unwrap_or_else(|| Arc::new(InMemoryResultChannel::new()));
        CourierRuntime::from_parts(&config, channel, self.issuer)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
