//! HTTP connector backed by reqwest.

use crate::connector::{AsyncConnectorCallback, Connector};
use crate::{ClientConfig, ClientError, ClientRequest, ClientResponse, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::{Handle, Runtime};
use tracing::Instrument;

/// Connector sending requests with a [`reqwest::Client`].
///
/// The connector owns a small tokio runtime for its I/O, so it can be used
/// from synchronous code. Asynchronous completions are reported from that
/// runtime's blocking pool, where they may issue further blocking requests.
pub struct HttpConnector {
    client: reqwest::Client,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    closed: AtomicBool,
}

impl HttpConnector {
    /// Create a connector from the connection settings in `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if config.gzip {
            builder = builder.gzip(true);
        }
        if config.brotli {
            builder = builder.brotli(true);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let client = builder.build().map_err(ClientError::connector)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("armature-client-connector")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            client,
            runtime: Mutex::new(Some(runtime)),
            handle,
            closed: AtomicBool::new(false),
        })
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Whether [`Connector::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn to_reqwest(request: &ClientRequest) -> reqwest::Request {
    let mut outgoing = reqwest::Request::new(request.method().clone(), request.uri().clone());
    *outgoing.headers_mut() = request.headers().clone();
    if let Some(entity) = request.entity() {
        *outgoing.body_mut() = Some(reqwest::Body::from(entity.clone()));
    }
    outgoing
}

async fn execute(
    client: reqwest::Client,
    request: Arc<ClientRequest>,
    outgoing: reqwest::Request,
) -> Result<ClientResponse> {
    let response = client.execute(outgoing).await.map_err(ClientError::connector)?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(ClientError::connector)?;
    tracing::debug!(uri = %request.uri(), status = %status, "Connector received response");

    Ok(ClientResponse::new(status, request)
        .with_headers(headers)
        .with_body(body))
}

/// Reports a failure if dropped without completing, e.g. when the task
/// carrying it is dropped by a runtime shutting down.
struct Pending(Option<Box<dyn AsyncConnectorCallback>>);

impl Pending {
    fn complete(mut self, outcome: Result<ClientResponse>) {
        if let Some(callback) = self.0.take() {
            match outcome {
                Ok(response) => callback.response(response),
                Err(error) => callback.failure(error),
            }
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(callback) = self.0.take() {
            callback.failure(ClientError::connector("connector shut down before completing the request"));
        }
    }
}

struct BlockingCallback(futures::channel::oneshot::Sender<Result<ClientResponse>>);

impl AsyncConnectorCallback for BlockingCallback {
    fn response(self: Box<Self>, response: ClientResponse) {
        let _ = self.0.send(Ok(response));
    }

    fn failure(self: Box<Self>, error: ClientError) {
        let _ = self.0.send(Err(error));
    }
}

impl Connector for HttpConnector {
    fn apply(&self, request: Arc<ClientRequest>) -> Result<ClientResponse> {
        let (sender, receiver) = futures::channel::oneshot::channel();
        self.apply_async(request, Box::new(BlockingCallback(sender)));
        futures::executor::block_on(receiver)
            .map_err(|_| ClientError::connector("connector dropped the request"))?
    }

    fn apply_async(&self, request: Arc<ClientRequest>, callback: Box<dyn AsyncConnectorCallback>) {
        let pending = Pending(Some(callback));
        if self.is_closed() {
            pending.complete(Err(ClientError::Closed));
            return;
        }

        let outgoing = to_reqwest(&request);
        let client = self.client.clone();
        tracing::trace!(method = %request.method(), uri = %request.uri(), "Connector sending request");
        self.handle.spawn(
            async move {
                let outcome = execute(client, request, outgoing).await;
                // Completions run filters, interceptors and callbacks that may
                // call `apply` on this connector, so keep them off the I/O workers.
                drop(tokio::task::spawn_blocking(move || pending.complete(outcome)));
            }
            .instrument(tracing::Span::current()),
        );
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(runtime) = self.runtime.lock().take() {
            tracing::debug!("Shutting down HTTP connector");
            runtime.shutdown_background();
        }
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}

impl Drop for HttpConnector {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector() -> Arc<HttpConnector> {
        Arc::new(HttpConnector::new(&ClientConfig::default()).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_sends_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("x-trace", "abc"))
            .and(body_string("widget"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector();
        let request = Arc::new(
            ClientRequest::post(&format!("{}/items", server.uri()))
                .unwrap()
                .with_header("X-Trace", "abc")
                .with_text("widget"),
        );
        let blocking = Arc::clone(&connector);
        let response = tokio::task::spawn_blocking(move || blocking.apply(request))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.text().unwrap(), "created");
        assert_eq!(response.request().uri().path(), "/items");
        connector.close();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_async_reports_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let connector = connector();
        let (sender, receiver) = futures::channel::oneshot::channel();
        let request = Arc::new(ClientRequest::get(&format!("{}/ping", server.uri())).unwrap());
        connector.apply_async(request, Box::new(BlockingCallback(sender)));

        let response = receiver.await.unwrap().unwrap();
        assert_eq!(response.text().unwrap(), "pong");
    }

    struct FollowUp {
        connector: Arc<HttpConnector>,
        request: Arc<ClientRequest>,
        sender: futures::channel::oneshot::Sender<Result<(StatusCode, ClientResponse)>>,
    }

    impl AsyncConnectorCallback for FollowUp {
        fn response(self: Box<Self>, response: ClientResponse) {
            let this = *self;
            let outcome = this
                .connector
                .apply(this.request)
                .map(|follow_up| (response.status(), follow_up));
            let _ = this.sender.send(outcome);
        }

        fn failure(self: Box<Self>, error: ClientError) {
            let _ = self.sender.send(Err(error));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completion_can_apply_synchronously() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_string("second"))
            .mount(&server)
            .await;

        let connector = connector();
        let (sender, receiver) = futures::channel::oneshot::channel();
        let first = Arc::new(ClientRequest::get(&format!("{}/first", server.uri())).unwrap());
        let second = Arc::new(ClientRequest::get(&format!("{}/second", server.uri())).unwrap());
        connector.apply_async(
            first,
            Box::new(FollowUp {
                connector: Arc::clone(&connector),
                request: second,
                sender,
            }),
        );

        let (first_status, follow_up) = tokio::time::timeout(std::time::Duration::from_secs(10), receiver)
            .await
            .expect("completion blocked the connector")
            .unwrap()
            .unwrap();
        assert_eq!(first_status, StatusCode::FORBIDDEN);
        assert_eq!(follow_up.text().unwrap(), "second");
        connector.close();
    }

    #[test]
    fn test_closed_connector_fails() {
        let connector = connector();
        connector.close();
        connector.close();
        assert!(connector.is_closed());
        let request = Arc::new(ClientRequest::get("http://localhost/").unwrap());
        assert!(connector.apply(request).unwrap_err().is_closed());
    }

    #[test]
    fn test_connection_refused_is_connector_error() {
        let connector = connector();
        let request = Arc::new(ClientRequest::get("http://127.0.0.1:9/").unwrap());
        assert!(connector.apply(request).unwrap_err().is_connector());
        assert_eq!(connector.name(), "reqwest");
    }
}
