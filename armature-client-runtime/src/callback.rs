//! Completion callbacks for asynchronous invocations.

use crate::scope::RequestScope;
use crate::{ClientError, ClientResponse, Result};
use tokio::sync::oneshot;

/// Receives the outcome of an asynchronous invocation.
///
/// Both methods consume the callback, so exactly one of them runs, once.
pub trait ResponseCallback: Send {
    /// The invocation produced a response.
    fn completed(self: Box<Self>, response: ClientResponse, scope: &dyn RequestScope);

    /// The invocation failed.
    fn failed(self: Box<Self>, error: ClientError);
}

/// Callback forwarding the outcome to a oneshot channel.
pub(crate) struct ChannelCallback {
    sender: oneshot::Sender<Result<ClientResponse>>,
}

impl ChannelCallback {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<ClientResponse>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    fn send(self, outcome: Result<ClientResponse>) {
        if self.sender.send(outcome).is_err() {
            tracing::trace!("Invocation outcome dropped, receiver is gone");
        }
    }
}

impl ResponseCallback for ChannelCallback {
    fn completed(self: Box<Self>, response: ClientResponse, _scope: &dyn RequestScope) {
        self.send(Ok(response));
    }

    fn failed(self: Box<Self>, error: ClientError) {
        self.send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientRequest;
    use crate::scope::TracingRequestScope;
    use http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_channel_callback_delivers_response() {
        let (callback, receiver) = ChannelCallback::new();
        let request = Arc::new(ClientRequest::get("http://localhost/").unwrap());
        Box::new(callback).completed(
            ClientResponse::new(StatusCode::CREATED, request),
            &TracingRequestScope,
        );
        let response = receiver.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_channel_callback_delivers_failure() {
        let (callback, receiver) = ChannelCallback::new();
        Box::new(callback).failed(ClientError::Closed);
        assert!(receiver.await.unwrap().unwrap_err().is_closed());
    }
}
