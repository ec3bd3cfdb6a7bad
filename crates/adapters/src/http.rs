//! HTTP transport adapter
//!
//! Implements [`TenantTransport`] on top of a shared `reqwest::Client`. The
//! client is cheap to clone and safe to use from parallel deploy workers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use skybridge_ports::{
    HttpMethod, TenantRequest, TenantResponse, TenantTransport, TransportError,
};
use tracing::debug;

use crate::config::{AuthMethod, ServiceCredentials};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Reqwest-backed tenant transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth: AuthMethod,
}

impl HttpTransport {
    pub fn new(credentials: &ServiceCredentials) -> Result<Self, TransportError> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        credentials: &ServiceCredentials,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: credentials.base_url(),
            auth: credentials.auth.clone(),
        })
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

#[async_trait]
impl TenantTransport for HttpTransport {
    async fn execute(&self, request: TenantRequest) -> Result<TenantResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("{} {}", request.method.as_str(), url);

        let mut builder = self.client.request(Self::method(request.method), &url);

        builder = match &self.auth {
            AuthMethod::None => builder,
            AuthMethod::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            AuthMethod::Bearer { token } => builder.bearer_auth(token),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .to_vec();

        Ok(TenantResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn credentials(url: &str, auth: AuthMethod) -> ServiceCredentials {
        ServiceCredentials {
            host: url.to_string(),
            auth,
        }
    }

    #[tokio::test]
    async fn test_get_with_basic_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/StringParameters")
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"d":{"results":[]}}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&credentials(
            &server.url(),
            AuthMethod::Basic {
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
        ))
        .unwrap();

        let response = transport
            .execute(TenantRequest::new(HttpMethod::Get, "/api/v1/StringParameters"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(
            response.header("Content-Type"),
            Some("application/json")
        );

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_with_bearer_auth_and_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/StringParameters")
            .match_header("authorization", "Bearer token-123")
            .match_header("content-type", "application/json")
            .match_body(r#"{"Pid":"P1"}"#)
            .with_status(201)
            .create_async()
            .await;

        let transport = HttpTransport::new(&credentials(
            &server.url(),
            AuthMethod::Bearer {
                token: "token-123".to_string(),
            },
        ))
        .unwrap();

        let request = TenantRequest::new(HttpMethod::Post, "/api/v1/StringParameters")
            .with_header("Content-Type", "application/json")
            .with_body(br#"{"Pid":"P1"}"#.to_vec());

        let response = transport.execute(request).await.unwrap();
        assert_eq!(response.status, 201);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_2xx_is_a_response_not_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .create_async()
            .await;

        let transport =
            HttpTransport::new(&credentials(&server.url(), AuthMethod::None)).unwrap();

        let response = transport
            .execute(TenantRequest::new(HttpMethod::Get, "/missing"))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.body, b"not here");
    }
}
