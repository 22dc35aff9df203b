//! # Armature Client Runtime
//!
//! The client-side invocation pipeline: an outgoing request passes through
//! ordered request filters, a transport connector and ordered response
//! filters, wrapped by invocation interceptors that may resolve failures.
//!
//! ## Features
//!
//! - **Filters**: Request filters (ascending priority) that may abort the request,
//!   response filters (descending priority)
//! - **Invocation Interceptors**: Pre-invocation hooks and post-invocation failure resolution
//! - **Stage Chains**: Iterative stage processing with constant stack depth
//! - **Sync and Async**: Blocking `invoke`, callback-driven `prepare_async` and awaitable `invoke_async`
//! - **Executors**: Lazily created async executor and background scheduler
//! - **Connector**: reqwest-backed HTTP connector with pooling and compression
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use armature_client_runtime::{ClientRequest, ClientRuntime, LoggingFilter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ClientRuntime::builder()
//!         .request_filter(LoggingFilter::new())
//!         .response_filter(LoggingFilter::new())
//!         .build()?;
//!
//!     let response = runtime.invoke(ClientRequest::get("https://api.example.com/users")?)?;
//!     println!("Status: {}", response.status());
//!
//!     runtime.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Resolving Failures
//!
//! ```rust,no_run
//! use armature_client_runtime::prelude::*;
//!
//! struct Fallback;
//!
//! impl PostInvocationInterceptor for Fallback {
//!     fn on_exception(
//!         &self,
//!         _request: &ClientRequest,
//!         context: &mut ExceptionContext,
//!     ) -> Result<(), BoxError> {
//!         context.resolve(Response::ok().with_text("fallback"))?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ClientRuntime::builder()
//!         .post_invocation_interceptor(Fallback)
//!         .build()?;
//!
//!     // Connection failures are replaced by the fallback response
//!     let response = runtime
//!         .invoke_async(ClientRequest::get("http://127.0.0.1:9/")?)
//!         .await?;
//!     assert_eq!(response.text()?, "fallback");
//!     Ok(())
//! }
//! ```

mod callback;
mod config;
mod connector;
mod error;
mod executor;
mod filter;
mod http_connector;
mod interceptor;
mod lifecycle;
mod provider;
mod request;
mod response;
mod runtime;
mod scope;
pub mod stage;

pub use callback::ResponseCallback;
pub use config::{
    ASYNC_THREADPOOL_SIZE_ENV, ClientConfig, ClientConfigBuilder, SCHEDULER_THREADPOOL_SIZE_ENV,
};
pub use connector::{AsyncConnectorCallback, Connector};
pub use error::{AggregateError, BoxError, ClientError, Result};
pub use executor::{ExecutorServiceProvider, ProvidedExecutor, ThreadPoolExecutorProvider};
pub use filter::{
    ClientRequestFilter, ClientResponseFilter, LoggingFilter, RequestFilterFn,
    RequestFilteringStage, RequestHalt, ResponseFilterFn, ResponseFilteringStage,
    request_filter_fn, response_filter_fn,
};
pub use http_connector::HttpConnector;
pub use interceptor::{
    ExceptionContext, PostInvocationInterceptor, PostInvocationStage, PreInvocationInterceptor,
    PreInvocationStage,
};
pub use lifecycle::ClientLifecycleListener;
pub use provider::{ProviderKind, Ranked, priorities};
pub use request::ClientRequest;
pub use response::{ClientResponse, Response};
pub use runtime::{AsyncInvocation, ClientRuntime, ClientRuntimeBuilder};
pub use scope::{RequestScope, ScopeGuard, TracingRequestScope};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use armature_client_runtime::prelude::*;
/// ```
pub mod prelude {
    pub use crate::callback::ResponseCallback;
    pub use crate::config::{ClientConfig, ClientConfigBuilder};
    pub use crate::connector::{AsyncConnectorCallback, Connector};
    pub use crate::error::{BoxError, ClientError, Result};
    pub use crate::filter::{ClientRequestFilter, ClientResponseFilter, LoggingFilter};
    pub use crate::http_connector::HttpConnector;
    pub use crate::interceptor::{
        ExceptionContext, PostInvocationInterceptor, PreInvocationInterceptor,
    };
    pub use crate::lifecycle::ClientLifecycleListener;
    pub use crate::provider::priorities;
    pub use crate::request::ClientRequest;
    pub use crate::response::{ClientResponse, Response};
    pub use crate::runtime::{ClientRuntime, ClientRuntimeBuilder};
    pub use crate::scope::RequestScope;
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
}
