//! Request scope.
//!
//! Every invocation runs inside the request scope, and connector callbacks
//! arriving on other threads enter it again before processing the response.

use std::any::Any;

/// Context entered around every unit of invocation work.
pub trait RequestScope: Send + Sync {
    /// Enter the scope. It is left when the guard drops.
    fn enter(&self) -> ScopeGuard;
}

/// Keeps a scope entered until dropped.
#[must_use = "the scope is left as soon as the guard is dropped"]
pub struct ScopeGuard {
    _state: Option<Box<dyn Any>>,
}

impl ScopeGuard {
    /// Guard holding `state` until it drops.
    pub fn new<T: 'static>(state: T) -> Self {
        Self {
            _state: Some(Box::new(state)),
        }
    }

    /// Guard without state.
    pub fn empty() -> Self {
        Self { _state: None }
    }
}

/// Default scope: a `request_scope` tracing span.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRequestScope;

impl RequestScope for TracingRequestScope {
    fn enter(&self) -> ScopeGuard {
        ScopeGuard::new(tracing::debug_span!("request_scope").entered())
    }
}
