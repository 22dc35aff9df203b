//! Client lifecycle listeners.

use crate::error::BoxError;

/// Notified when a client runtime is built and when it is closed.
///
/// Failures are logged and otherwise ignored.
pub trait ClientLifecycleListener: Send + Sync {
    /// Called once, when the runtime has been built.
    fn on_init(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once, when the runtime is closed.
    fn on_close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
