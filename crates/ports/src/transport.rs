//! Tenant Transport Port
//!
//! A minimal request/response seam over the tenant's HTTP API. Everything the
//! remote platform needs beyond this (authentication flows, CSRF tokens,
//! cookies) stays inside the implementing adapter.

use async_trait::async_trait;

/// HTTP methods used against the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

/// A request to the tenant, addressed by path relative to the API host
#[derive(Debug, Clone)]
pub struct TenantRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl TenantRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// A response from the tenant
#[derive(Debug, Clone)]
pub struct TenantResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TenantResponse {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Tenant transport port
#[async_trait]
pub trait TenantTransport: Send + Sync {
    /// Execute a request against the tenant.
    ///
    /// Non-2xx statuses are returned as responses, not errors; only transport
    /// failures (connection, timeout, malformed request) become errors.
    async fn execute(&self, request: TenantRequest) -> Result<TenantResponse, TransportError>;
}

/// Tenant transport error
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
