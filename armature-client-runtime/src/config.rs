//! Client runtime configuration.

use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;

/// Environment variable holding the async executor pool size.
pub const ASYNC_THREADPOOL_SIZE_ENV: &str = "ARMATURE_CLIENT_ASYNC_THREADPOOL_SIZE";

/// Environment variable holding the background scheduler pool size.
pub const SCHEDULER_THREADPOOL_SIZE_ENV: &str = "ARMATURE_CLIENT_SCHEDULER_THREADPOOL_SIZE";

/// Client runtime configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Headers added to every request that does not already carry them.
    pub default_headers: Vec<(String, String)>,
    /// Properties seeded into every request that does not override them.
    pub properties: HashMap<String, serde_json::Value>,
    /// Worker threads of the async executor. `0` lets the runtime decide.
    pub async_threadpool_size: usize,
    /// Worker threads of the background scheduler. `0` lets the runtime decide.
    pub scheduler_threadpool_size: usize,
    /// Executor supplied by the caller. Never shut down by the runtime.
    pub executor: Option<Handle>,
    /// Scheduler supplied by the caller. Never shut down by the runtime.
    pub scheduled_executor: Option<Handle>,
    /// Use the tokio runtime the client is built on, if any.
    pub use_ambient_runtime: bool,
    /// Default request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Idle timeout for pooled connections.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Enable gzip compression.
    pub gzip: bool,
    /// Enable brotli compression.
    pub brotli: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_headers: Vec::new(),
            properties: HashMap::new(),
            async_threadpool_size: 0,
            scheduler_threadpool_size: 0,
            executor: None,
            scheduled_executor: None,
            use_ambient_runtime: true,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            gzip: true,
            brotli: true,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Default configuration with pool sizes read from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Default configuration with pool sizes read through `lookup`.
    ///
    /// Negative sizes are clamped to zero; values that are not integers are
    /// ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(size) = pool_size(&lookup, ASYNC_THREADPOOL_SIZE_ENV) {
            config.async_threadpool_size = size;
        }
        if let Some(size) = pool_size(&lookup, SCHEDULER_THREADPOOL_SIZE_ENV) {
            config.scheduler_threadpool_size = size;
        }
        config
    }
}

fn pool_size(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<i64>() {
        Ok(size) => Some(usize::try_from(size.max(0)).unwrap_or(usize::MAX)),
        Err(e) => {
            tracing::warn!(variable = key, value = %raw, error = %e, "Ignoring invalid pool size");
            None
        }
    }
}

/// Builder for client runtime configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Add a client-wide property.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.properties.insert(name.into(), value.into());
        self
    }

    /// Set the async executor pool size. Negative values mean `0`.
    pub fn async_threadpool_size(mut self, size: i64) -> Self {
        self.config.async_threadpool_size = usize::try_from(size.max(0)).unwrap_or(usize::MAX);
        self
    }

    /// Set the background scheduler pool size. Negative values mean `0`.
    pub fn scheduler_threadpool_size(mut self, size: i64) -> Self {
        self.config.scheduler_threadpool_size = usize::try_from(size.max(0)).unwrap_or(usize::MAX);
        self
    }

    /// Use a caller-owned executor for async invocations.
    pub fn executor(mut self, handle: Handle) -> Self {
        self.config.executor = Some(handle);
        self
    }

    /// Use a caller-owned executor for scheduled tasks.
    pub fn scheduled_executor(mut self, handle: Handle) -> Self {
        self.config.scheduled_executor = Some(handle);
        self
    }

    /// Enable or disable adopting the current tokio runtime.
    pub fn use_ambient_runtime(mut self, enable: bool) -> Self {
        self.config.use_ambient_runtime = enable;
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Enable or disable gzip compression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable brotli compression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.config.brotli = enable;
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
