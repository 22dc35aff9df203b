//! Invocation interceptors.
//!
//! Invocation interceptors wrap the whole invocation: pre-invocation
//! interceptors run before any request filter, post-invocation interceptors
//! run after response filtering and get a chance to resolve failures.
//!
//! Post-invocation processing is a two-state machine. While no failure is
//! pending each interceptor's [`PostInvocationInterceptor::after_request`] is
//! called; once one is pending [`PostInvocationInterceptor::on_exception`] is
//! called instead, until an interceptor resolves it with
//! [`ExceptionContext::resolve`].

use crate::error::{BoxError, is_usage_error, suppress};
use crate::filter::ClientRequestFilter;
use crate::provider::{self, ProviderKind, Ranked};
use crate::{ClientError, ClientRequest, ClientResponse, Response, Result};
use std::collections::VecDeque;
use std::sync::Arc;

/// Interceptor called before request filtering.
pub trait PreInvocationInterceptor: Send + Sync {
    /// Inspect or mutate the request. The request may be aborted with
    /// [`ClientRequest::abort_with`]; no request filter runs in that case.
    fn before_request(&self, request: &mut ClientRequest) -> std::result::Result<(), BoxError>;
}

/// Interceptor called once the response or failure is known.
pub trait PostInvocationInterceptor: Send + Sync {
    /// Called while no failure is pending.
    fn after_request(
        &self,
        _request: &ClientRequest,
        _response: &mut ClientResponse,
    ) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Called while failures are pending.
    fn on_exception(
        &self,
        _request: &ClientRequest,
        _context: &mut ExceptionContext,
    ) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// Pending failures handed to [`PostInvocationInterceptor::on_exception`].
#[derive(Debug, Default)]
pub struct ExceptionContext {
    response: Option<ClientResponse>,
    throwables: VecDeque<BoxError>,
    resolved: Option<Response>,
}

impl ExceptionContext {
    fn seed(&mut self, error: ClientError) {
        match error {
            ClientError::Aggregate(aggregate) => self.throwables.extend(aggregate.into_errors()),
            other => self.throwables.push_back(Box::new(other)),
        }
    }

    /// The last response, if the invocation produced one.
    pub fn response_context(&self) -> Option<&ClientResponse> {
        self.response.as_ref()
    }

    /// Mutable access to the last response.
    pub fn response_context_mut(&mut self) -> Option<&mut ClientResponse> {
        self.response.as_mut()
    }

    /// Failures in occurrence order.
    pub fn throwables(&self) -> &VecDeque<BoxError> {
        &self.throwables
    }

    /// Mutable access to the pending failures.
    pub fn throwables_mut(&mut self) -> &mut VecDeque<BoxError> {
        &mut self.throwables
    }

    /// Replace the pending failures with `response`.
    ///
    /// A context can only be resolved once.
    pub fn resolve(&mut self, response: Response) -> Result<()> {
        if self.resolved.is_some() {
            tracing::warn!("Invocation failure resolved more than once");
            return Err(ClientError::Usage(
                "resolve called on an already resolved invocation".to_string(),
            ));
        }
        tracing::trace!(status = %response.status(), "Invocation failure resolved");
        self.resolved = Some(response);
        Ok(())
    }

    /// Whether [`ExceptionContext::resolve`] has been called.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    fn phase(&self) -> PostPhase {
        if self.throwables.is_empty() && self.response.is_some() {
            PostPhase::WithoutException
        } else {
            PostPhase::WithException
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostPhase {
    WithoutException,
    WithException,
}

/// Runs pre-invocation interceptors in descending priority order.
pub struct PreInvocationStage {
    interceptors: Vec<Arc<dyn PreInvocationInterceptor>>,
}

impl PreInvocationStage {
    /// Create the stage.
    pub fn new(mut interceptors: Vec<Ranked<dyn PreInvocationInterceptor>>) -> Self {
        provider::debug_assert_kind(&interceptors, ProviderKind::PreInvocationInterceptor);
        provider::sort_descending(&mut interceptors);
        Self {
            interceptors: interceptors.iter().map(|i| Arc::clone(i.inner())).collect(),
        }
    }

    /// Whether any interceptor is registered.
    pub fn has_pre_invocation_interceptors(&self) -> bool {
        !self.interceptors.is_empty()
    }

    /// Run every interceptor, then surface the collected failures.
    pub fn before_request(&self, request: &mut ClientRequest) -> Result<()> {
        let mut throwables = VecDeque::new();
        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.before_request(request) {
                if is_usage_error(&e) {
                    return Err(ClientError::from_boxed(e));
                }
                tracing::debug!(uri = %request.uri(), error = %e, "Pre-invocation interceptor failed");
                throwables.push_back(e);
            }
        }
        if throwables.is_empty() {
            Ok(())
        } else {
            Err(suppress(throwables))
        }
    }

    /// Filter placed ahead of all request filters so that an abort requested
    /// by a pre-invocation interceptor is picked up before any filter runs.
    pub fn abort_probe(&self) -> Arc<dyn ClientRequestFilter> {
        Arc::new(AbortProbe)
    }
}

struct AbortProbe;

impl ClientRequestFilter for AbortProbe {
    fn filter(&self, _request: &mut ClientRequest) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// Runs post-invocation interceptors in ascending priority order.
pub struct PostInvocationStage {
    interceptors: Vec<Arc<dyn PostInvocationInterceptor>>,
}

impl PostInvocationStage {
    /// Create the stage.
    pub fn new(mut interceptors: Vec<Ranked<dyn PostInvocationInterceptor>>) -> Self {
        provider::debug_assert_kind(&interceptors, ProviderKind::PostInvocationInterceptor);
        provider::sort_ascending(&mut interceptors);
        Self {
            interceptors: interceptors.iter().map(|i| Arc::clone(i.inner())).collect(),
        }
    }

    /// Whether any interceptor is registered.
    pub fn has_post_invocation_interceptors(&self) -> bool {
        !self.interceptors.is_empty()
    }

    /// Run the interceptors over the outcome of the invocation.
    ///
    /// Returns the final response, or the failures nobody resolved. Usage
    /// errors are returned as they are, without consulting interceptors.
    pub fn after_request(
        &self,
        request: &Arc<ClientRequest>,
        outcome: Result<ClientResponse>,
    ) -> Result<ClientResponse> {
        let mut context = ExceptionContext::default();
        match outcome {
            Ok(response) => context.response = Some(response),
            Err(error) if error.is_usage() => return Err(error),
            Err(error) => context.seed(error),
        }

        let mut phase = context.phase();
        for interceptor in &self.interceptors {
            match phase {
                PostPhase::WithoutException => {
                    if let Some(response) = context.response.as_mut()
                        && let Err(e) = interceptor.after_request(request, response)
                    {
                        if is_usage_error(&e) {
                            return Err(ClientError::from_boxed(e));
                        }
                        tracing::debug!(uri = %request.uri(), error = %e, "Post-invocation interceptor failed");
                        context.throwables.push_back(e);
                    }
                }
                PostPhase::WithException => {
                    let caught = match interceptor.on_exception(request, &mut context) {
                        Ok(()) => None,
                        Err(e) if is_usage_error(&e) => return Err(ClientError::from_boxed(e)),
                        Err(e) => Some(e),
                    };
                    if let Some(resolved) = context.resolved.take() {
                        context.throwables.clear();
                        context.response =
                            Some(ClientResponse::from_response(Arc::clone(request), resolved));
                    }
                    if let Some(e) = caught {
                        tracing::debug!(uri = %request.uri(), error = %e, "Post-invocation interceptor failed");
                        context.throwables.push_back(e);
                    }
                }
            }
            phase = context.phase();
        }

        match (phase, context.response) {
            (PostPhase::WithoutException, Some(response)) => Ok(response),
            _ => Err(suppress(context.throwables)),
        }
    }
}
