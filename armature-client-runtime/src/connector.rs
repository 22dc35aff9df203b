//! Transport connector interface.

use crate::{ClientError, ClientRequest, ClientResponse, Result};
use std::sync::Arc;

/// Completion handler for [`Connector::apply_async`].
///
/// Both methods consume the callback, so exactly one of them runs, once.
pub trait AsyncConnectorCallback: Send {
    /// The connector produced a response.
    fn response(self: Box<Self>, response: ClientResponse);

    /// The connector failed.
    fn failure(self: Box<Self>, error: ClientError);
}

/// Sends requests over the wire.
pub trait Connector: Send + Sync {
    /// Send `request` and wait for the response.
    fn apply(&self, request: Arc<ClientRequest>) -> Result<ClientResponse>;

    /// Send `request` and report the outcome to `callback`.
    ///
    /// The callback may run on a thread owned by the connector. The default
    /// implementation calls [`Connector::apply`] on the current thread.
    fn apply_async(&self, request: Arc<ClientRequest>, callback: Box<dyn AsyncConnectorCallback>) {
        match self.apply(request) {
            Ok(response) => callback.response(response),
            Err(error) => callback.failure(error),
        }
    }

    /// Release resources held by the connector.
    fn close(&self) {}

    /// Name used in the default `User-Agent` header.
    fn name(&self) -> &str;
}
