//! Response types.
//!
//! [`Response`] is a ready-made response supplied by an extension point, either
//! to abort a request or to resolve a failure. [`ClientResponse`] is the mutable
//! response context flowing through response filters and post-invocation
//! interceptors; it keeps a reference to the request that produced it.

use crate::{ClientError, ClientRequest, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Ready-made response used for aborts and resolutions.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    entity: Option<Bytes>,
}

impl Response {
    /// Response with the given status.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            entity: None,
        }
    }

    /// 200 OK.
    pub fn ok() -> Self {
        Self::with_status(StatusCode::OK)
    }

    /// 202 Accepted.
    pub fn accepted() -> Self {
        Self::with_status(StatusCode::ACCEPTED)
    }

    /// 204 No Content.
    pub fn no_content() -> Self {
        Self::with_status(StatusCode::NO_CONTENT)
    }

    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response entity.
    pub fn entity(&self) -> Option<&Bytes> {
        self.entity.as_ref()
    }

    /// Add a header, ignoring names or values that are not valid.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "Ignoring invalid response header"),
        }
        self
    }

    /// Set the entity as raw bytes.
    pub fn with_entity(mut self, entity: impl Into<Bytes>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the entity as text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.entity = Some(Bytes::from(text.into()));
        self
    }

    /// Set the entity as JSON.
    pub fn with_json<T: Serialize>(mut self, json: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(json).map_err(|e| ClientError::Entity(e.to_string()))?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.entity = Some(Bytes::from(bytes));
        Ok(self)
    }
}

/// Mutable response context.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    request: Arc<ClientRequest>,
}

impl ClientResponse {
    /// Create an empty response to `request`.
    pub fn new(status: StatusCode, request: Arc<ClientRequest>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request,
        }
    }

    /// Create a response context from a ready-made response.
    pub fn from_response(request: Arc<ClientRequest>, response: Response) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.entity.unwrap_or_default(),
            request,
        }
    }

    /// Replace headers, builder style.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replace the body, builder style.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Request that produced this response.
    pub fn request(&self) -> &ClientRequest {
        &self.request
    }

    pub(crate) fn request_handle(&self) -> Arc<ClientRequest> {
        Arc::clone(&self.request)
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Replace the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response was a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response was a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response body as bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Whether the response carries a body.
    pub fn has_entity(&self) -> bool {
        !self.body.is_empty()
    }

    /// Replace the response body.
    pub fn set_entity(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Consume the response and return the body as bytes.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| ClientError::Entity(e.to_string()))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Entity(e.to_string()))
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}
