//! Engine configuration.
//!
//! `FloodgateOptions` is the single configuration object: it collects
//! throttle rules, selects the counter store backend, and constructs the
//! engine. The rule registry moves into the engine at `build()`, so rules
//! cannot change once decisions are being served.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::identity::{IdentifierResolver, RequestMeta};
use crate::store::{CounterStore, MemoryStore, RedisStore};
use crate::throttle::{
    Counting, RuleRegistry, RulesConfig, ThrottleEngine, ThrottleRule, DEFAULT_STATUS_CODE,
};

/// Default namespace prefix for store keys.
pub const DEFAULT_NAMESPACE: &str = "floodgate";

/// Which counter store backend holds throttle state.
enum StoreBackend {
    Memory,
    Redis { url: String },
    Custom(Arc<dyn CounterStore>),
}

impl fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("Memory"),
            StoreBackend::Redis { url } => f.debug_struct("Redis").field("url", url).finish(),
            StoreBackend::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Configuration for the throttle engine.
///
/// A counter store backend must be selected explicitly; `build()` refuses a
/// configuration without one so the mistake surfaces at startup, never
/// mid-traffic.
#[derive(Debug)]
pub struct FloodgateOptions {
    registry: RuleRegistry,
    backend: Option<StoreBackend>,
    status_code: u16,
    namespace: String,
    counting: Counting,
    resolver: IdentifierResolver,
}

impl Default for FloodgateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl FloodgateOptions {
    /// Start an empty configuration.
    pub fn new() -> Self {
        Self {
            registry: RuleRegistry::new(),
            backend: None,
            status_code: DEFAULT_STATUS_CODE,
            namespace: DEFAULT_NAMESPACE.to_string(),
            counting: Counting::BestEffort,
            resolver: IdentifierResolver::remote_addr(),
        }
    }

    /// Keep counters in process memory.
    ///
    /// Fast and dependency-free, but state is lost on restart and not
    /// shared across instances.
    pub fn use_memory_store(mut self) -> Self {
        self.backend = Some(StoreBackend::Memory);
        self
    }

    /// Keep counters in Redis so multiple instances share admission state.
    /// Recommended for production deployments.
    pub fn use_redis_store(mut self, url: impl Into<String>) -> Self {
        self.backend = Some(StoreBackend::Redis { url: url.into() });
        self
    }

    /// Use a caller-provided store implementation.
    pub fn use_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.backend = Some(StoreBackend::Custom(store));
        self
    }

    /// Status code served to throttled callers. Defaults to 429.
    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Namespace prefix for store keys. Defaults to `"floodgate"`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Route admit increments through the store's atomic increment
    /// primitive instead of the default read-then-write counting.
    pub fn atomic_counting(mut self) -> Self {
        self.counting = Counting::Atomic;
        self
    }

    /// Install a custom identifier resolver. Without one, callers are
    /// identified by their network address.
    pub fn identify_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestMeta) -> Option<String> + Send + Sync + 'static,
    {
        self.resolver = IdentifierResolver::custom(f);
        self
    }

    /// Throttle one action: at most `max_requests` admissions per `window`.
    pub fn throttle(
        mut self,
        scope: &str,
        action: &str,
        window: Duration,
        max_requests: u32,
    ) -> Result<Self> {
        let rule = ThrottleRule::new(window, max_requests)?;
        self.registry.register(scope, action, rule);
        Ok(self)
    }

    /// Throttle every action in a scope with the same rule.
    ///
    /// Replaces any concrete rules already registered for the scope;
    /// register concrete rules afterwards to tighten individual actions.
    pub fn throttle_all(mut self, scope: &str, window: Duration, max_requests: u32) -> Result<Self> {
        let rule = ThrottleRule::new(window, max_requests)?;
        self.registry.register_wildcard(scope, rule);
        Ok(self)
    }

    /// Load throttle rules from a YAML file, applied in file order after
    /// any rules already registered.
    pub fn rules_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let config = RulesConfig::from_file(path)?;
        config.apply(&mut self.registry)?;
        Ok(self)
    }

    /// Validate the configuration and construct the engine.
    ///
    /// # Errors
    /// Returns `FloodgateError::Config` when no store backend was selected,
    /// and any error from connecting a remote backend.
    pub async fn build(self) -> Result<ThrottleEngine> {
        let backend = self.backend.ok_or_else(|| {
            FloodgateError::Config("a counter store backend must be selected".to_string())
        })?;

        let store: Arc<dyn CounterStore> = match backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redis { url } => Arc::new(RedisStore::connect(&url).await?),
            StoreBackend::Custom(store) => store,
        };

        info!(
            rules = self.registry.len(),
            namespace = %self.namespace,
            counting = ?self.counting,
            "Throttle engine configured"
        );

        Ok(ThrottleEngine::new(
            self.registry,
            store,
            self.namespace,
            self.status_code,
            self.counting,
            self.resolver,
        ))
    }
}
