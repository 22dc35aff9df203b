//! Client runtime.
//!
//! [`ClientRuntime`] owns the request and response stage chains, the
//! invocation interceptors, the connector and the executors. It is built once
//! per configured client with [`ClientRuntimeBuilder`] and reused for every
//! invocation.

use crate::callback::{ChannelCallback, ResponseCallback};
use crate::connector::{AsyncConnectorCallback, Connector};
use crate::executor::{ExecutorServiceProvider, LazyExecutor};
use crate::filter::{ClientRequestFilter, ClientResponseFilter, RequestFilteringStage, RequestHalt, ResponseFilteringStage};
use crate::interceptor::{PostInvocationInterceptor, PostInvocationStage, PreInvocationInterceptor, PreInvocationStage};
use crate::lifecycle::ClientLifecycleListener;
use crate::provider::{ProviderKind, Ranked, priorities};
use crate::scope::{RequestScope, TracingRequestScope};
use crate::stage::{self, StageRef, Stages};
use crate::{ClientConfig, ClientError, ClientRequest, ClientResponse, HttpConnector, Result};
use http::header::USER_AGENT;
use http::{HeaderName, HeaderValue};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Span;

const ASYNC_EXECUTOR_NAME: &str = "armature-client-async";
const SCHEDULER_NAME: &str = "armature-client-scheduler";

/// Client runtime driving invocations through filters, interceptors and the
/// connector.
///
/// Cloning is cheap; clones share the same runtime. The runtime is closed by
/// [`ClientRuntime::close`], or when the last clone and the last pending
/// invocation are dropped.
#[derive(Clone)]
pub struct ClientRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    request_root: StageRef<ClientRequest, RequestHalt>,
    response_root: StageRef<ClientResponse, ClientError>,
    pre: PreInvocationStage,
    post: PostInvocationStage,
    connector: Arc<dyn Connector>,
    scope: Arc<dyn RequestScope>,
    config: ClientConfig,
    executor: LazyExecutor,
    scheduler: LazyExecutor,
    listeners: Vec<Arc<dyn ClientLifecycleListener>>,
    closed: AtomicBool,
}

impl ClientRuntime {
    /// Create a new runtime builder.
    pub fn builder() -> ClientRuntimeBuilder {
        ClientRuntimeBuilder::default()
    }

    /// Run `request` on the calling thread.
    ///
    /// Pre-invocation interceptors, request filters, the connector, response
    /// filters and post-invocation interceptors run in that order. Failures
    /// other than usage errors are offered to post-invocation interceptors
    /// before they are returned.
    pub fn invoke(&self, request: ClientRequest) -> Result<ClientResponse> {
        self.inner.ensure_open()?;
        let span = invocation_span(&request);
        let _entered = span.enter();
        let _scope = self.inner.scope.enter();
        self.inner.invoke(request)
    }

    /// Prepare `request` for asynchronous execution.
    ///
    /// Nothing happens until [`AsyncInvocation::run`] is called. The outcome,
    /// including a failure of any stage, is delivered to `callback`.
    pub fn prepare_async(
        &self,
        request: ClientRequest,
        callback: Box<dyn ResponseCallback>,
    ) -> AsyncInvocation {
        AsyncInvocation {
            span: invocation_span(&request),
            runtime: Arc::clone(&self.inner),
            request,
            callback,
        }
    }

    /// Run `request` on the async executor, reporting to `callback`.
    ///
    /// When the executor is unavailable the failure goes to the callback too.
    pub fn invoke_with_callback(&self, request: ClientRequest, callback: Box<dyn ResponseCallback>) {
        let executor = self.inner.ensure_open().and_then(|()| self.inner.executor.get());
        match executor {
            Ok(handle) => {
                let invocation = self.prepare_async(request, callback);
                drop(handle.spawn_blocking(move || invocation.run()));
            }
            Err(error) => callback.failed(error),
        }
    }

    /// Run `request` on the async executor and wait for the outcome.
    pub async fn invoke_async(&self, request: ClientRequest) -> Result<ClientResponse> {
        let (callback, receiver) = ChannelCallback::new();
        self.invoke_with_callback(request, Box::new(callback));
        receiver
            .await
            .map_err(|_| ClientError::Executor("invocation dropped before completion".to_string()))?
    }

    /// Run a task on the async executor, inside the request scope.
    pub fn submit<F, R>(&self, task: F) -> Result<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.ensure_open()?;
        let handle = self.inner.executor.get()?;
        let scope = Arc::clone(&self.inner.scope);
        Ok(handle.spawn_blocking(move || {
            let _scope = scope.enter();
            task()
        }))
    }

    /// Run a task on the background scheduler after `delay`.
    ///
    /// The scheduler needs the tokio time driver; caller-supplied schedulers
    /// must have it enabled.
    pub fn schedule<F, R>(&self, task: F, delay: Duration) -> Result<JoinHandle<Result<R>>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.ensure_open()?;
        let handle = self.inner.scheduler.get()?;
        let scope = Arc::clone(&self.inner.scope);
        Ok(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::task::spawn_blocking(move || {
                let _scope = scope.enter();
                task()
            })
            .await
            .map_err(|e| ClientError::Executor(e.to_string()))
        }))
    }

    /// Close the runtime. Only the first call has an effect.
    ///
    /// Lifecycle listeners are notified, then the connector is closed and the
    /// executors created by the runtime are shut down. Invocations in flight
    /// are not cancelled; new ones fail with [`ClientError::Closed`].
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether the runtime has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get the connector.
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.inner.connector
    }

    /// Get the request scope.
    pub fn request_scope(&self) -> &Arc<dyn RequestScope> {
        &self.inner.scope
    }

    /// Whether pre-invocation interceptors are registered.
    pub fn has_pre_invocation_interceptors(&self) -> bool {
        self.inner.pre.has_pre_invocation_interceptors()
    }

    /// Whether post-invocation interceptors are registered.
    pub fn has_post_invocation_interceptors(&self) -> bool {
        self.inner.post.has_post_invocation_interceptors()
    }
}

impl fmt::Debug for ClientRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRuntime")
            .field("connector", &self.inner.connector.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn invocation_span(request: &ClientRequest) -> Span {
    tracing::debug_span!("client_invocation", method = %request.method(), uri = %request.uri())
}

impl RuntimeInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            tracing::debug!("Rejecting work, client runtime is closed");
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    fn invoke(&self, mut request: ClientRequest) -> Result<ClientResponse> {
        if let Err(error) = self.pre.before_request(&mut request) {
            return self.post.after_request(&Arc::new(request), Err(error));
        }

        let (request, outcome) = match stage::process(request, &self.request_root) {
            Ok(mut request) => {
                self.add_user_agent(&mut request);
                let request = Arc::new(request);
                let outcome = self
                    .connector
                    .apply(Arc::clone(&request))
                    .and_then(|response| self.filter_response(response));
                (request, outcome)
            }
            Err(RequestHalt::Aborted { request, response }) => {
                let request = Arc::new(request);
                let response = ClientResponse::from_response(Arc::clone(&request), response);
                (request, self.filter_response(response))
            }
            Err(RequestHalt::Failed { request, error }) => (Arc::new(request), Err(error)),
        };

        self.post.after_request(&request, outcome)
    }

    fn run_async(
        self: &Arc<Self>,
        mut request: ClientRequest,
        callback: Box<dyn ResponseCallback>,
        span: Span,
    ) {
        let _entered = span.enter();
        let _scope = self.scope.enter();
        if let Err(error) = self.ensure_open() {
            callback.failed(error);
            return;
        }
        if let Err(error) = self.pre.before_request(&mut request) {
            self.complete(&Arc::new(request), Err(error), callback);
            return;
        }

        match stage::process(request, &self.request_root) {
            Ok(mut request) => {
                self.add_user_agent(&mut request);
                let request = Arc::new(request);
                let completion = ConnectorCompletion {
                    runtime: Arc::clone(self),
                    request: Arc::clone(&request),
                    callback,
                    span: span.clone(),
                };
                self.connector.apply_async(request, Box::new(completion));
            }
            Err(RequestHalt::Aborted { request, response }) => {
                let request = Arc::new(request);
                let response = ClientResponse::from_response(Arc::clone(&request), response);
                let outcome = self.filter_response(response);
                self.complete(&request, outcome, callback);
            }
            Err(RequestHalt::Failed { request, error }) => {
                self.complete(&Arc::new(request), Err(error), callback);
            }
        }
    }

    fn filter_response(&self, response: ClientResponse) -> Result<ClientResponse> {
        stage::process(response, &self.response_root)
    }

    fn complete(
        &self,
        request: &Arc<ClientRequest>,
        outcome: Result<ClientResponse>,
        callback: Box<dyn ResponseCallback>,
    ) {
        match self.post.after_request(request, outcome) {
            Ok(response) => callback.completed(response, self.scope.as_ref()),
            Err(error) => callback.failed(error),
        }
    }

    fn add_user_agent(&self, request: &mut ClientRequest) {
        if request.is_user_agent_suppressed() {
            request.remove_header(USER_AGENT.as_str());
            return;
        }
        if request.has_header(USER_AGENT) {
            return;
        }

        let name = self.connector.name();
        let agent = if name.is_empty() {
            format!("Armature/{}", env!("CARGO_PKG_VERSION"))
        } else {
            format!("Armature/{} ({})", env!("CARGO_PKG_VERSION"), name)
        };
        match HeaderValue::from_str(&agent) {
            Ok(value) => {
                request.headers_mut().insert(USER_AGENT, value);
            }
            Err(e) => tracing::warn!(connector = name, error = %e, "Invalid default User-Agent"),
        }
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::debug!(connector = self.connector.name(), "Closing client runtime");

        for listener in &self.listeners {
            if let Err(e) = listener.on_close() {
                tracing::warn!(error = %e, "Lifecycle listener failed on close");
            }
        }
        self.connector.close();
        self.executor.dispose();
        self.scheduler.dispose();
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Deferred asynchronous invocation created by [`ClientRuntime::prepare_async`].
#[must_use = "an async invocation does nothing until it is run"]
pub struct AsyncInvocation {
    runtime: Arc<RuntimeInner>,
    request: ClientRequest,
    callback: Box<dyn ResponseCallback>,
    span: Span,
}

impl AsyncInvocation {
    /// Run the invocation inside the request scope. The outcome goes to the
    /// callback, possibly from a connector thread.
    pub fn run(self) {
        let Self {
            runtime,
            request,
            callback,
            span,
        } = self;
        runtime.run_async(request, callback, span);
    }
}

impl fmt::Debug for AsyncInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInvocation")
            .field("method", self.request.method())
            .field("uri", &self.request.uri().as_str())
            .finish()
    }
}

/// Connector callback re-entering the request scope to finish an invocation.
struct ConnectorCompletion {
    runtime: Arc<RuntimeInner>,
    request: Arc<ClientRequest>,
    callback: Box<dyn ResponseCallback>,
    span: Span,
}

impl AsyncConnectorCallback for ConnectorCompletion {
    fn response(self: Box<Self>, response: ClientResponse) {
        let Self {
            runtime,
            request,
            callback,
            span,
        } = *self;
        let _entered = span.enter();
        let _scope = runtime.scope.enter();
        let outcome = runtime.filter_response(response);
        runtime.complete(&request, outcome, callback);
    }

    fn failure(self: Box<Self>, error: ClientError) {
        let Self {
            runtime,
            request,
            callback,
            span,
        } = *self;
        let _entered = span.enter();
        let _scope = runtime.scope.enter();
        tracing::debug!(error = %error, "Connector failed");
        runtime.complete(&request, Err(error), callback);
    }
}

/// Builder for [`ClientRuntime`].
#[derive(Default)]
pub struct ClientRuntimeBuilder {
    config: ClientConfig,
    request_filters: Vec<Ranked<dyn ClientRequestFilter>>,
    response_filters: Vec<Ranked<dyn ClientResponseFilter>>,
    pre_interceptors: Vec<Ranked<dyn PreInvocationInterceptor>>,
    post_interceptors: Vec<Ranked<dyn PostInvocationInterceptor>>,
    listeners: Vec<Arc<dyn ClientLifecycleListener>>,
    connector: Option<Arc<dyn Connector>>,
    scope: Option<Arc<dyn RequestScope>>,
    executor_provider: Option<Arc<dyn ExecutorServiceProvider>>,
    scheduler_provider: Option<Arc<dyn ExecutorServiceProvider>>,
}

impl ClientRuntimeBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a request filter with the default priority.
    pub fn request_filter(self, filter: impl ClientRequestFilter + 'static) -> Self {
        self.request_filter_with_priority(filter, priorities::USER)
    }

    /// Register a request filter. Lower priorities run first.
    pub fn request_filter_with_priority(
        mut self,
        filter: impl ClientRequestFilter + 'static,
        priority: i32,
    ) -> Self {
        self.request_filters.push(Ranked::new(
            Arc::new(filter),
            priority,
            ProviderKind::RequestFilter,
        ));
        self
    }

    /// Register a response filter with the default priority.
    pub fn response_filter(self, filter: impl ClientResponseFilter + 'static) -> Self {
        self.response_filter_with_priority(filter, priorities::USER)
    }

    /// Register a response filter. Higher priorities run first.
    pub fn response_filter_with_priority(
        mut self,
        filter: impl ClientResponseFilter + 'static,
        priority: i32,
    ) -> Self {
        self.response_filters.push(Ranked::new(
            Arc::new(filter),
            priority,
            ProviderKind::ResponseFilter,
        ));
        self
    }

    /// Register a pre-invocation interceptor with the default priority.
    pub fn pre_invocation_interceptor(self, interceptor: impl PreInvocationInterceptor + 'static) -> Self {
        self.pre_invocation_interceptor_with_priority(interceptor, priorities::USER)
    }

    /// Register a pre-invocation interceptor. Higher priorities run first.
    pub fn pre_invocation_interceptor_with_priority(
        mut self,
        interceptor: impl PreInvocationInterceptor + 'static,
        priority: i32,
    ) -> Self {
        self.pre_interceptors.push(Ranked::new(
            Arc::new(interceptor),
            priority,
            ProviderKind::PreInvocationInterceptor,
        ));
        self
    }

    /// Register a post-invocation interceptor with the default priority.
    pub fn post_invocation_interceptor(self, interceptor: impl PostInvocationInterceptor + 'static) -> Self {
        self.post_invocation_interceptor_with_priority(interceptor, priorities::USER)
    }

    /// Register a post-invocation interceptor. Lower priorities run first.
    pub fn post_invocation_interceptor_with_priority(
        mut self,
        interceptor: impl PostInvocationInterceptor + 'static,
        priority: i32,
    ) -> Self {
        self.post_interceptors.push(Ranked::new(
            Arc::new(interceptor),
            priority,
            ProviderKind::PostInvocationInterceptor,
        ));
        self
    }

    /// Register a lifecycle listener.
    pub fn lifecycle_listener(mut self, listener: impl ClientLifecycleListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Set the connector. Defaults to an [`HttpConnector`] built from the
    /// configuration.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the request scope. Defaults to [`TracingRequestScope`].
    pub fn request_scope(mut self, scope: Arc<dyn RequestScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Provide the async executor, unless the configuration carries a handle.
    pub fn executor_provider(mut self, provider: Arc<dyn ExecutorServiceProvider>) -> Self {
        self.executor_provider = Some(provider);
        self
    }

    /// Provide the background scheduler, unless the configuration carries a
    /// handle.
    pub fn scheduled_executor_provider(mut self, provider: Arc<dyn ExecutorServiceProvider>) -> Self {
        self.scheduler_provider = Some(provider);
        self
    }

    /// Build the runtime and notify lifecycle listeners.
    pub fn build(self) -> Result<ClientRuntime> {
        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(HttpConnector::new(&self.config)?),
        };

        let pre = PreInvocationStage::new(self.pre_interceptors);
        let post = PostInvocationStage::new(self.post_interceptors);
        let request_root = request_chain(&self.config, self.request_filters, &pre)?;
        let response_filtering = ResponseFilteringStage::new(self.response_filters);
        let response_root: StageRef<ClientResponse, ClientError> = if response_filtering.is_empty() {
            Stages::identity()
        } else {
            Arc::new(response_filtering)
        };

        let executor = LazyExecutor::resolve(
            ASYNC_EXECUTOR_NAME,
            self.config.executor.clone(),
            self.executor_provider,
            self.config.async_threadpool_size,
            self.config.use_ambient_runtime,
        );
        let scheduler = LazyExecutor::resolve(
            SCHEDULER_NAME,
            self.config.scheduled_executor.clone(),
            self.scheduler_provider,
            self.config.scheduler_threadpool_size,
            self.config.use_ambient_runtime,
        );

        let inner = RuntimeInner {
            request_root,
            response_root,
            pre,
            post,
            connector,
            scope: self.scope.unwrap_or_else(|| Arc::new(TracingRequestScope)),
            config: self.config,
            executor,
            scheduler,
            listeners: self.listeners,
            closed: AtomicBool::new(false),
        };

        for listener in &inner.listeners {
            if let Err(e) = listener.on_init() {
                tracing::warn!(error = %e, "Lifecycle listener failed on init");
            }
        }
        tracing::debug!(connector = inner.connector.name(), "Client runtime initialized");

        Ok(ClientRuntime {
            inner: Arc::new(inner),
        })
    }
}

/// Initialization stage followed by request filtering.
///
/// The initialization stage applies default headers the request does not
/// carry and properties it does not set.
fn request_chain(
    config: &ClientConfig,
    filters: Vec<Ranked<dyn ClientRequestFilter>>,
    pre: &PreInvocationStage,
) -> Result<StageRef<ClientRequest, RequestHalt>> {
    let headers = config
        .default_headers
        .iter()
        .map(|(name, value)| {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("default header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidRequest(format!("default header '{}': {}", name, e)))?;
            Ok((header, value))
        })
        .collect::<Result<Vec<_>>>()?;
    let properties = config.properties.clone();

    let initialization = Stages::chain(move |mut request: ClientRequest| {
        let present: HashSet<HeaderName> = request.headers().keys().cloned().collect();
        for (name, value) in &headers {
            if !present.contains(name) {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }
        for (name, value) in &properties {
            if request.property(name).is_none() {
                request.set_property(name.clone(), value.clone());
            }
        }
        Ok(request)
    });

    let leading = pre
        .has_pre_invocation_interceptors()
        .then(|| pre.abort_probe());
    let filtering = RequestFilteringStage::new(filters, leading);

    Ok(if filtering.is_empty() {
        initialization.build()
    } else {
        initialization.build_to(Arc::new(filtering))
    })
}
