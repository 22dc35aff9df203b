//! Client request context.

use crate::{ClientError, Response, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

/// Mutable request record passed through one invocation.
///
/// Filters and pre-invocation interceptors mutate it in place. A filter may
/// short-circuit the invocation by calling [`ClientRequest::abort_with`].
#[derive(Debug, Clone)]
pub struct ClientRequest {
    method: Method,
    uri: Url,
    headers: HeaderMap,
    entity: Option<Bytes>,
    properties: HashMap<String, serde_json::Value>,
    abort_response: Option<Response>,
    suppress_user_agent: bool,
}

impl ClientRequest {
    /// Create a request for `uri`.
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            entity: None,
            properties: HashMap::new(),
            abort_response: None,
            suppress_user_agent: false,
        }
    }

    /// Create a request, parsing `uri`.
    pub fn parse(method: Method, uri: &str) -> Result<Self> {
        Ok(Self::new(method, Url::parse(uri)?))
    }

    /// Create a GET request.
    pub fn get(uri: &str) -> Result<Self> {
        Self::parse(Method::GET, uri)
    }

    /// Create a POST request.
    pub fn post(uri: &str) -> Result<Self> {
        Self::parse(Method::POST, uri)
    }

    /// Create a PUT request.
    pub fn put(uri: &str) -> Result<Self> {
        Self::parse(Method::PUT, uri)
    }

    /// Create a DELETE request.
    pub fn delete(uri: &str) -> Result<Self> {
        Self::parse(Method::DELETE, uri)
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Replace the HTTP method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Target URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Replace the target URI.
    pub fn set_uri(&mut self, uri: Url) {
        self.uri = uri;
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Check whether a header is present.
    pub fn has_header(&self, name: impl AsRef<str>) -> bool {
        self.headers.contains_key(name.as_ref())
    }

    /// Set a header, replacing existing values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append a header value, keeping existing values.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Remove all values of a header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Add a header, ignoring names or values that are not valid.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if let Err(e) = self.set_header(&name, &value.into()) {
            tracing::warn!(header = %name, error = %e, "Ignoring invalid request header");
        }
        self
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.uri.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(self, username: impl Into<String>, password: Option<impl Into<String>>) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.with_header("Authorization", format!("Basic {}", encoded))
    }

    /// Request entity.
    pub fn entity(&self) -> Option<&Bytes> {
        self.entity.as_ref()
    }

    /// Whether the request carries an entity.
    pub fn has_entity(&self) -> bool {
        self.entity.is_some()
    }

    /// Replace the request entity.
    pub fn set_entity(&mut self, entity: impl Into<Bytes>) {
        self.entity = Some(entity.into());
    }

    /// Set the entity as raw bytes.
    pub fn with_entity(mut self, entity: impl Into<Bytes>) -> Self {
        self.set_entity(entity);
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

    /// Set the entity as form data.
    pub fn with_form<T: Serialize>(mut self, form: &T) -> Result<Self> {
        let encoded =
            serde_urlencoded::to_string(form).map_err(|e| ClientError::Entity(e.to_string()))?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.entity = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Property value.
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    /// Names of all properties.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Set a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Remove a property, returning its value.
    pub fn remove_property(&mut self, name: &str) -> Option<serde_json::Value> {
        self.properties.remove(name)
    }

    /// Set a property, builder style.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Short-circuit the invocation with a ready-made response.
    ///
    /// The connector is not called; the response goes straight to response
    /// filtering. Aborting twice is a usage error.
    pub fn abort_with(&mut self, response: Response) -> Result<()> {
        if self.abort_response.is_some() {
            tracing::warn!(uri = %self.uri, "Request aborted more than once");
            return Err(ClientError::Usage(
                "abort_with called on an already aborted request".to_string(),
            ));
        }
        tracing::trace!(uri = %self.uri, status = %response.status(), "Request aborted");
        self.abort_response = Some(response);
        Ok(())
    }

    /// Response supplied through [`ClientRequest::abort_with`].
    pub fn abort_response(&self) -> Option<&Response> {
        self.abort_response.as_ref()
    }

    /// Whether the request has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.abort_response.is_some()
    }

    /// Do not send a `User-Agent` header, removing one already set.
    pub fn suppress_user_agent(&mut self) {
        self.suppress_user_agent = true;
    }

    /// Builder form of [`ClientRequest::suppress_user_agent`].
    pub fn without_user_agent(mut self) -> Self {
        self.suppress_user_agent();
        self
    }

    /// Whether the `User-Agent` header is suppressed.
    pub fn is_user_agent_suppressed(&self) -> bool {
        self.suppress_user_agent
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ClientError::InvalidRequest(format!("header name '{}': {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| ClientError::InvalidRequest(format!("header value for '{}': {}", name, e)))?;
    Ok((name, value))
}
