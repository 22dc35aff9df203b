//! Request and response filters.
//!
//! Request filters run in ascending priority order and may abort the request
//! with a ready-made [`Response`]. Response filters run in descending priority
//! order. Both are driven as [`Stage`]s.

use crate::error::{BoxError, is_usage_error};
use crate::provider::{self, ProviderKind, Ranked};
use crate::stage::{Continuation, Stage};
use crate::{ClientError, ClientRequest, ClientResponse, Response};
use std::sync::Arc;

/// Filter applied to outgoing requests.
pub trait ClientRequestFilter: Send + Sync {
    /// Inspect or mutate the request. Call [`ClientRequest::abort_with`] to
    /// skip the connector.
    fn filter(&self, request: &mut ClientRequest) -> Result<(), BoxError>;
}

/// Filter applied to incoming responses.
pub trait ClientResponseFilter: Send + Sync {
    /// Inspect or mutate the response.
    fn filter(&self, request: &ClientRequest, response: &mut ClientResponse) -> Result<(), BoxError>;
}

/// Request filter backed by a closure.
pub struct RequestFilterFn<F>(F);

/// Create a request filter from a closure.
pub fn request_filter_fn<F>(f: F) -> RequestFilterFn<F>
where
    F: Fn(&mut ClientRequest) -> Result<(), BoxError> + Send + Sync,
{
    RequestFilterFn(f)
}

impl<F> ClientRequestFilter for RequestFilterFn<F>
where
    F: Fn(&mut ClientRequest) -> Result<(), BoxError> + Send + Sync,
{
    fn filter(&self, request: &mut ClientRequest) -> Result<(), BoxError> {
        (self.0)(request)
    }
}

/// Response filter backed by a closure.
pub struct ResponseFilterFn<F>(F);

/// Create a response filter from a closure.
pub fn response_filter_fn<F>(f: F) -> ResponseFilterFn<F>
where
    F: Fn(&ClientRequest, &mut ClientResponse) -> Result<(), BoxError> + Send + Sync,
{
    ResponseFilterFn(f)
}

impl<F> ClientResponseFilter for ResponseFilterFn<F>
where
    F: Fn(&ClientRequest, &mut ClientResponse) -> Result<(), BoxError> + Send + Sync,
{
    fn filter(&self, request: &ClientRequest, response: &mut ClientResponse) -> Result<(), BoxError> {
        (self.0)(request, response)
    }
}

/// Why the request chain stopped before reaching the connector.
#[derive(Debug)]
pub enum RequestHalt {
    /// A filter supplied a response with [`ClientRequest::abort_with`].
    Aborted {
        /// The request as left by the aborting filter.
        request: ClientRequest,
        /// The abort response.
        response: Response,
    },
    /// A filter failed.
    Failed {
        /// The request as left by the failing filter.
        request: ClientRequest,
        /// The failure.
        error: ClientError,
    },
}

/// Stage running all request filters.
pub struct RequestFilteringStage {
    filters: Vec<Arc<dyn ClientRequestFilter>>,
}

impl RequestFilteringStage {
    /// Sort `filters` ascending by priority.
    ///
    /// A `leading` filter runs ahead of all the sorted ones, regardless of
    /// priority.
    pub fn new(
        mut filters: Vec<Ranked<dyn ClientRequestFilter>>,
        leading: Option<Arc<dyn ClientRequestFilter>>,
    ) -> Self {
        provider::debug_assert_kind(&filters, ProviderKind::RequestFilter);
        provider::sort_ascending(&mut filters);
        let filters = leading
            .into_iter()
            .chain(filters.iter().map(|f| Arc::clone(f.inner())))
            .collect();
        Self { filters }
    }

    /// Number of filters, including a leading one.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether no filters are registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Stage<ClientRequest, RequestHalt> for RequestFilteringStage {
    fn apply(
        &self,
        mut request: ClientRequest,
    ) -> Result<Continuation<ClientRequest, RequestHalt>, RequestHalt> {
        for filter in &self.filters {
            if let Err(e) = filter.filter(&mut request) {
                tracing::debug!(uri = %request.uri(), error = %e, "Request filter failed");
                return Err(RequestHalt::Failed {
                    request,
                    error: ClientError::from_boxed(e),
                });
            }
            if let Some(response) = request.abort_response().cloned() {
                return Err(RequestHalt::Aborted { request, response });
            }
        }
        Ok(Continuation::terminal(request))
    }
}

/// Stage running all response filters.
pub struct ResponseFilteringStage {
    filters: Vec<Arc<dyn ClientResponseFilter>>,
}

impl ResponseFilteringStage {
    /// Sort `filters` descending by priority.
    pub fn new(mut filters: Vec<Ranked<dyn ClientResponseFilter>>) -> Self {
        provider::debug_assert_kind(&filters, ProviderKind::ResponseFilter);
        provider::sort_descending(&mut filters);
        Self {
            filters: filters.iter().map(|f| Arc::clone(f.inner())).collect(),
        }
    }

    /// Whether no filters are registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Stage<ClientResponse, ClientError> for ResponseFilteringStage {
    fn apply(
        &self,
        mut response: ClientResponse,
    ) -> Result<Continuation<ClientResponse, ClientError>, ClientError> {
        let request = response.request_handle();
        for filter in &self.filters {
            if let Err(e) = filter.filter(&request, &mut response) {
                tracing::debug!(uri = %request.uri(), error = %e, "Response filter failed");
                if is_usage_error(&e) {
                    return Err(ClientError::from_boxed(e));
                }
                return Err(ClientError::ResponseProcessing(e));
            }
        }
        Ok(Continuation::terminal(response))
    }
}

/// Filter that logs requests and responses.
#[derive(Debug, Clone, Default)]
pub struct LoggingFilter {
    log_headers: bool,
}

impl LoggingFilter {
    /// Create a new logging filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable logging of headers.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl ClientRequestFilter for LoggingFilter {
    fn filter(&self, request: &mut ClientRequest) -> Result<(), BoxError> {
        tracing::debug!(
            method = %request.method(),
            url = %request.uri(),
            "Sending HTTP request"
        );

        if self.log_headers {
            for (name, value) in request.headers() {
                tracing::trace!(header = %name, value = ?value, "Request header");
            }
        }
        Ok(())
    }
}

impl ClientResponseFilter for LoggingFilter {
    fn filter(&self, request: &ClientRequest, response: &mut ClientResponse) -> Result<(), BoxError> {
        tracing::debug!(
            url = %request.uri(),
            status = %response.status(),
            "Received HTTP response"
        );

        if self.log_headers {
            for (name, value) in response.headers() {
                tracing::trace!(header = %name, value = ?value, "Response header");
            }
        }
        Ok(())
    }
}
