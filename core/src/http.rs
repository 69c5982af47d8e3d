//! HTTP transport types.
//!
//! # Design
//! Requests and responses are plain data. `BaseApi` builds `HttpRequest`
//! values and hands them to a `Transport`; the transport returns an
//! `HttpResponse` for every status code it receives, so 4xx/5xx replies reach
//! the response normalizer as data rather than as errors. Only failures that
//! produce no response at all (connection refused, timeout) surface as
//! `ApiError`.

use serde_json::Value;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Key used by the duplicate guard: method plus full URL.
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parse the body as JSON. A blank body (e.g. 204 No Content) is `None`.
    pub fn json(&self) -> Result<Option<Value>, ApiError> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.body)
            .map(Some)
            .map_err(|e| ApiError::Deserialization(e.to_string()))
    }
}

/// Executes an `HttpRequest` against the network.
///
/// Implementations must return `Ok` for every response that arrives,
/// whatever its status code. Clients holding a transport may move across
/// threads, so implementations must be `Send + Sync`.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).execute(request)
    }
}
