//! Registered extension points and their ordering.

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

/// Well-known priorities. Lower values run first in ascending chains.
pub mod priorities {
    /// Authentication filters.
    pub const AUTHENTICATION: i32 = 1000;
    /// Authorization filters.
    pub const AUTHORIZATION: i32 = 2000;
    /// Header decorators.
    pub const HEADER_DECORATOR: i32 = 3000;
    /// Entity coders.
    pub const ENTITY_CODER: i32 = 4000;
    /// Default priority for user extensions.
    pub const USER: i32 = 5000;
}

/// Kind of a registered extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Runs on the outgoing request.
    RequestFilter,
    /// Runs on the incoming response.
    ResponseFilter,
    /// Wraps the invocation before filtering.
    PreInvocationInterceptor,
    /// Wraps the invocation after response filtering.
    PostInvocationInterceptor,
}

/// An extension point with its priority.
pub struct Ranked<T: ?Sized> {
    priority: i32,
    kind: ProviderKind,
    inner: Arc<T>,
}

impl<T: ?Sized> Ranked<T> {
    /// Wrap an extension point.
    pub fn new(inner: Arc<T>, priority: i32, kind: ProviderKind) -> Self {
        Self {
            priority,
            kind,
            inner,
        }
    }

    /// Priority of the extension point.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Kind of the extension point.
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// The extension point itself.
    pub fn get(&self) -> &T {
        &self.inner
    }

    /// Shared handle to the extension point.
    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

impl<T: ?Sized> Clone for Ranked<T> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            kind: self.kind,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Ranked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ranked")
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Check that every provider was registered as `kind`.
pub(crate) fn debug_assert_kind<T: ?Sized>(providers: &[Ranked<T>], kind: ProviderKind) {
    debug_assert!(
        providers.iter().all(|p| p.kind == kind),
        "extension point registered with the wrong kind, expected {:?}",
        kind
    );
}

/// Sort by ascending priority. Equal priorities keep registration order.
pub(crate) fn sort_ascending<T: ?Sized>(providers: &mut [Ranked<T>]) {
    providers.sort_by_key(|p| p.priority);
}

/// Sort by descending priority. Equal priorities keep registration order.
pub(crate) fn sort_descending<T: ?Sized>(providers: &mut [Ranked<T>]) {
    providers.sort_by_key(|p| Reverse(p.priority));
}
