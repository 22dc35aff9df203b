//! Executors for asynchronous invocations and background tasks.
//!
//! An executor is a tokio [`Handle`]. Work submitted to it runs on the
//! runtime's blocking pool, since invocations call blocking connector and
//! extension code.

use crate::{ClientError, Result};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::{Handle, Runtime};

/// Supplies an executor and disposes of it when the client closes.
pub trait ExecutorServiceProvider: Send + Sync {
    /// Return the executor, creating it on first use.
    fn executor_service(&self) -> Result<Handle>;

    /// Release the executor. Called once, when the client closes.
    fn dispose(&self, executor: &Handle);
}

/// Executor owned by someone else. Disposing it does nothing.
#[derive(Debug, Clone)]
pub struct ProvidedExecutor(Handle);

impl ProvidedExecutor {
    /// Wrap a handle.
    pub fn new(handle: Handle) -> Self {
        Self(handle)
    }
}

impl ExecutorServiceProvider for ProvidedExecutor {
    fn executor_service(&self) -> Result<Handle> {
        Ok(self.0.clone())
    }

    fn dispose(&self, _executor: &Handle) {}
}

/// Multi-threaded runtime created on first use and shut down on dispose.
pub struct ThreadPoolExecutorProvider {
    name: String,
    size: usize,
    runtime: Mutex<Option<Runtime>>,
    disposed: AtomicBool,
}

impl ThreadPoolExecutorProvider {
    /// Pool with `size` workers; `0` uses tokio's defaults.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            runtime: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Configured pool size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the pool has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl ExecutorServiceProvider for ThreadPoolExecutorProvider {
    fn executor_service(&self) -> Result<Handle> {
        let mut slot = self.runtime.lock();
        if self.is_disposed() {
            return Err(ClientError::Executor(format!("{} has been disposed", self.name)));
        }
        if let Some(runtime) = slot.as_ref() {
            return Ok(runtime.handle().clone());
        }

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name(self.name.clone());
        if self.size > 0 {
            builder.worker_threads(self.size).max_blocking_threads(self.size);
        }
        let runtime = builder.build()?;
        tracing::debug!(name = %self.name, size = self.size, "Created client executor");

        let handle = runtime.handle().clone();
        *slot = Some(runtime);
        Ok(handle)
    }

    fn dispose(&self, _executor: &Handle) {
        self.disposed.store(true, Ordering::Release);
        if let Some(runtime) = self.runtime.lock().take() {
            tracing::debug!(name = %self.name, "Shutting down client executor");
            runtime.shutdown_background();
        }
    }
}

impl Drop for ThreadPoolExecutorProvider {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which tokio forbids inside async code.
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for ThreadPoolExecutorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutorProvider")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Executor resolved on first use and disposed on close.
pub(crate) struct LazyExecutor {
    provider: Arc<dyn ExecutorServiceProvider>,
    handle: OnceCell<Handle>,
}

impl LazyExecutor {
    pub(crate) fn new(provider: Arc<dyn ExecutorServiceProvider>) -> Self {
        Self {
            provider,
            handle: OnceCell::new(),
        }
    }

    /// Pick the provider: a caller handle, then a registered provider, then a
    /// sized pool, then the ambient runtime, then an unbounded pool.
    pub(crate) fn resolve(
        name: &str,
        handle: Option<Handle>,
        provider: Option<Arc<dyn ExecutorServiceProvider>>,
        size: usize,
        use_ambient_runtime: bool,
    ) -> Self {
        if let Some(handle) = handle {
            return Self::new(Arc::new(ProvidedExecutor::new(handle)));
        }
        if let Some(provider) = provider {
            return Self::new(provider);
        }
        if size == 0
            && use_ambient_runtime
            && let Ok(ambient) = Handle::try_current()
        {
            tracing::debug!(name, "Using ambient tokio runtime");
            return Self::new(Arc::new(ProvidedExecutor::new(ambient)));
        }
        Self::new(Arc::new(ThreadPoolExecutorProvider::new(name, size)))
    }

    pub(crate) fn get(&self) -> Result<Handle> {
        self.handle
            .get_or_try_init(|| self.provider.executor_service())
            .cloned()
    }

    pub(crate) fn dispose(&self) {
        if let Some(handle) = self.handle.get() {
            self.provider.dispose(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_is_lazy_and_disposable() {
        let provider = ThreadPoolExecutorProvider::new("test-pool", 2);
        assert!(provider.runtime.lock().is_none());

        let handle = provider.executor_service().unwrap();
        let value = futures::executor::block_on(handle.spawn(async { 21 * 2 })).unwrap();
        assert_eq!(value, 42);

        provider.dispose(&handle);
        assert!(provider.is_disposed());
        assert!(provider.executor_service().is_err());
    }

    #[test]
    fn test_resolve_prefers_caller_handle() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let executor = LazyExecutor::resolve("test", Some(runtime.handle().clone()), None, 4, true);
        let handle = executor.get().unwrap();
        executor.dispose();
        let value = runtime.block_on(handle.spawn(async { 7 })).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_resolve_without_ambient_creates_pool() {
        let executor = LazyExecutor::resolve("test-default", None, None, 0, true);
        let handle = executor.get().unwrap();
        assert!(futures::executor::block_on(handle.spawn_blocking(|| true)).unwrap());
        executor.dispose();
        assert!(executor.provider.executor_service().is_err());
    }

    #[tokio::test]
    async fn test_resolve_adopts_ambient_runtime() {
        let executor = LazyExecutor::resolve("test-ambient", None, None, 0, true);
        let handle = executor.get().unwrap();
        assert_eq!(
            handle.runtime_flavor(),
            tokio::runtime::RuntimeFlavor::CurrentThread
        );
        executor.dispose();
        assert!(executor.get().is_ok());
    }
}
