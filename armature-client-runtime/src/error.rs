//! Client runtime error types.

use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Boxed error raised by filters, interceptors and lifecycle listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for client runtime operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Client runtime errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Processing failed without an underlying cause.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Processing failed because of another error.
    #[error("{message}: {source}")]
    Caused {
        /// Context for the failure.
        message: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// A response filter failed.
    #[error("Response processing failed: {0}")]
    ResponseProcessing(#[source] BoxError),

    /// The connector could not complete the request.
    #[error("Connector error: {0}")]
    Connector(#[source] BoxError),

    /// Several unresolved failures surfaced together.
    #[error(transparent)]
    Aggregate(AggregateError),

    /// An extension point misused the runtime API.
    #[error("Illegal usage: {0}")]
    Usage(String),

    /// The runtime was closed and accepts no new work.
    #[error("Client runtime is closed")]
    Closed,

    /// Executor could not be created or has been disposed.
    #[error("Executor error: {0}")]
    Executor(String),

    /// Request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Entity could not be decoded.
    #[error("Entity error: {0}")]
    Entity(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Wrap a connector failure.
    pub fn connector(error: impl Into<BoxError>) -> Self {
        Self::Connector(error.into())
    }

    /// Convert an arbitrary error into a client error.
    ///
    /// A boxed `ClientError` is unwrapped and returned unchanged, anything else
    /// becomes the source of a [`ClientError::Caused`].
    pub fn from_boxed(error: BoxError) -> Self {
        match error.downcast::<ClientError>() {
            Ok(client_error) => *client_error,
            Err(other) => Self::Caused {
                message: "Processing failed".to_string(),
                source: other,
            },
        }
    }

    /// Check if this is a usage error.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Check if this error was raised because the runtime is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if this error was produced by the connector.
    pub fn is_connector(&self) -> bool {
        matches!(self, Self::Connector(_))
    }

    /// Errors carried by an aggregate, empty for every other variant.
    pub fn suppressed(&self) -> &[BoxError] {
        match self {
            Self::Aggregate(aggregate) => aggregate.errors(),
            _ => &[],
        }
    }
}

/// Check whether a boxed error is a [`ClientError::Usage`].
pub(crate) fn is_usage_error(error: &BoxError) -> bool {
    matches!(error.downcast_ref::<ClientError>(), Some(ClientError::Usage(_)))
}

/// Surface accumulated failures as a single error.
///
/// One failure is returned unchanged when it already is a `ClientError`, a
/// foreign one is wrapped. Several failures become an aggregate in occurrence
/// order.
pub(crate) fn suppress(mut errors: VecDeque<BoxError>) -> ClientError {
    match errors.len() {
        0 => ClientError::Processing("invocation finished without a response".to_string()),
        1 => match errors.pop_front() {
            Some(error) => ClientError::from_boxed(error),
            None => ClientError::Processing("invocation finished without a response".to_string()),
        },
        _ => ClientError::Aggregate(AggregateError {
            errors: errors.into_iter().collect(),
        }),
    }
}

/// Failures surfaced together. The first one is reported as the source.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<BoxError>,
}

impl AggregateError {
    /// All suppressed errors in occurrence order.
    pub fn errors(&self) -> &[BoxError] {
        &self.errors
    }

    /// Consume the aggregate and return its errors.
    pub fn into_errors(self) -> Vec<BoxError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failures during invocation", self.errors.len())?;
        if let Some(first) = self.errors.first() {
            write!(f, "; first: {}", first)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
