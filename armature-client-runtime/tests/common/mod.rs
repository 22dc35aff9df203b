//! Shared fixtures for the client runtime integration tests.

#![allow(dead_code)]

use armature_client_runtime::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

pub const URL: &str = "http://localhost:8080/resource";

pub fn get() -> ClientRequest {
    ClientRequest::get(URL).unwrap()
}

// =============================================================================
// Connector
// =============================================================================

pub enum Behavior {
    Respond(StatusCode, &'static str),
    Fail(&'static str),
}

/// Connector answering from memory. Async completions arrive on a thread of
/// their own, like a real connector's I/O thread.
pub struct MockConnector {
    behavior: Behavior,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
    pub sent: Mutex<Vec<ClientRequest>>,
}

impl MockConnector {
    pub fn responding(status: StatusCode, body: &'static str) -> Arc<Self> {
        Arc::new(Self::new(Behavior::Respond(status, body)))
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self::new(Behavior::Fail(message)))
    }

    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn outcome(&self, request: Arc<ClientRequest>) -> Result<ClientResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push((*request).clone());
        match self.behavior {
            Behavior::Respond(status, body) => {
                Ok(ClientResponse::new(status, request).with_body(body))
            }
            Behavior::Fail(message) => Err(ClientError::connector(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message,
            ))),
        }
    }
}

impl Connector for MockConnector {
    fn apply(&self, request: Arc<ClientRequest>) -> Result<ClientResponse> {
        self.outcome(request)
    }

    fn apply_async(&self, request: Arc<ClientRequest>, callback: Box<dyn AsyncConnectorCallback>) {
        let outcome = self.outcome(request);
        std::thread::spawn(move || match outcome {
            Ok(response) => callback.response(response),
            Err(error) => callback.failure(error),
        });
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub fn runtime_with(connector: &Arc<MockConnector>) -> ClientRuntimeBuilder {
    ClientRuntime::builder().connector(Arc::clone(connector) as Arc<dyn Connector>)
}

// =============================================================================
// Interceptors
// =============================================================================

type AfterFn =
    Box<dyn Fn(&ClientRequest, &mut ClientResponse) -> Result<(), BoxError> + Send + Sync>;
type ExceptionFn =
    Box<dyn Fn(&ClientRequest, &mut ExceptionContext) -> Result<(), BoxError> + Send + Sync>;

/// Post-invocation interceptor built from closures, counting its calls.
pub struct Post {
    after: AfterFn,
    exception: ExceptionFn,
    pub calls: Arc<AtomicUsize>,
}

impl Post {
    pub fn new(
        after: impl Fn(&ClientRequest, &mut ClientResponse) -> Result<(), BoxError> + Send + Sync + 'static,
        exception: impl Fn(&ClientRequest, &mut ExceptionContext) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            after: Box::new(after),
            exception: Box::new(exception),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counting(mut self, calls: &Arc<AtomicUsize>) -> Self {
        self.calls = Arc::clone(calls);
        self
    }
}

impl PostInvocationInterceptor for Post {
    fn after_request(&self, request: &ClientRequest, response: &mut ClientResponse) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.after)(request, response)
    }

    fn on_exception(&self, request: &ClientRequest, context: &mut ExceptionContext) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.exception)(request, context)
    }
}

/// Pre-invocation interceptor built from a closure.
pub struct Pre<F>(pub F);

impl<F> PreInvocationInterceptor for Pre<F>
where
    F: Fn(&mut ClientRequest) -> Result<(), BoxError> + Send + Sync,
{
    fn before_request(&self, request: &mut ClientRequest) -> Result<(), BoxError> {
        (self.0)(request)
    }
}

pub fn pre<F>(f: F) -> Pre<F>
where
    F: Fn(&mut ClientRequest) -> Result<(), BoxError> + Send + Sync,
{
    Pre(f)
}

pub fn pass_after(_: &ClientRequest, _: &mut ClientResponse) -> Result<(), BoxError> {
    Ok(())
}

pub fn pass_exception(_: &ClientRequest, _: &mut ExceptionContext) -> Result<(), BoxError> {
    Ok(())
}

// =============================================================================
// Callbacks
// =============================================================================

pub type Outcome = std::result::Result<ClientResponse, ClientError>;

/// Callback counting its invocations and forwarding the outcome.
pub struct Recorder {
    pub completed: Arc<AtomicUsize>,
    pub failed: Arc<AtomicUsize>,
    sender: mpsc::Sender<Outcome>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::Receiver<Outcome>) {
        let (sender, receiver) = mpsc::channel();
        let recorder = Self {
            completed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            sender,
        };
        (recorder, receiver)
    }
}

impl ResponseCallback for Recorder {
    fn completed(self: Box<Self>, response: ClientResponse, _scope: &dyn RequestScope) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(Ok(response));
    }

    fn failed(self: Box<Self>, error: ClientError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(Err(error));
    }
}

pub fn wait(receiver: &mpsc::Receiver<Outcome>) -> Outcome {
    receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("invocation did not complete")
}

// =============================================================================
// Scope and lifecycle
// =============================================================================

/// Scope counting how often it is entered.
#[derive(Default)]
pub struct CountingScope {
    pub entered: AtomicUsize,
}

impl RequestScope for CountingScope {
    fn enter(&self) -> ScopeGuard {
        self.entered.fetch_add(1, Ordering::SeqCst);
        ScopeGuard::empty()
    }
}

#[derive(Default)]
pub struct CountingListener {
    pub inits: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub fail: bool,
}

impl ClientLifecycleListener for CountingListener {
    fn on_init(&self) -> Result<(), BoxError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_close(&self) -> Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("listener failed".into());
        }
        Ok(())
    }
}
