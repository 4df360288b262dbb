//! HTTP client for backend calls, wrapped in the retry policy

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::domain::{DomainError, RetryPolicy};

/// Fully read HTTP response
#[derive(Debug, Clone)]
pub struct BackendResponse {
    status: StatusCode,
    body: String,
}

impl BackendResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parses the body as JSON
    pub fn json<T: DeserializeOwned>(&self, backend: &str) -> Result<T, DomainError> {
        serde_json::from_str(&self.body).map_err(|e| {
            DomainError::rejected(backend, format!("Failed to parse response: {}", e))
        })
    }
}

/// reqwest client whose calls go through a [`RetryPolicy`].
///
/// Transport failures and statuses >= 429 are retried. After the last attempt the
/// final response is returned as-is so callers can turn it into a permanent error.
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    client: Client,
    retry: RetryPolicy,
    backend: &'static str,
}

impl RetryingHttpClient {
    pub fn new(backend: &'static str, timeout: Duration) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::backend_init(backend, format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::default(),
            backend,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Sends the request produced by `build`, rebuilding it for every attempt
    pub async fn send<F>(&self, build: F) -> Result<BackendResponse, DomainError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let build = &build;
        let client = &self.client;

        let result = self
            .retry
            .run(
                || async move {
                    let response = build(client).send().await?;
                    let status = response.status();
                    let body = response.text().await?;
                    Ok::<_, reqwest::Error>(BackendResponse { status, body })
                },
                |result| match result {
                    Err(err) => {
                        warn!(backend = self.backend, error = %err, "Backend call failed");
                        true
                    }
                    Ok(response) if is_retryable(response.status) => {
                        warn!(
                            backend = self.backend,
                            status = response.status.as_u16(),
                            "Backend call returned retryable status"
                        );
                        true
                    }
                    Ok(_) => false,
                },
            )
            .await;

        result.map_err(|e| {
            DomainError::unavailable(
                self.backend,
                format!("Request failed after {} attempts: {}", self.retry.max_attempts(), e),
            )
        })
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.as_u16() >= 429
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> RetryingHttpClient {
        RetryingHttpClient::new("test", Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(
                RetryPolicy::new(3)
                    .with_min_wait(Duration::from_millis(1))
                    .with_max_wait(Duration::from_millis(5)),
            )
    }

    #[tokio::test]
    async fn test_service_unavailable_is_attempted_retry_count_plus_one_times() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tokens"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .expect(4)
            .mount(&server)
            .await;

        let url = format!("{}/tokens", server.uri());
        let response = client().send(|c| c.post(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body(), "try later");
    }

    #[tokio::test]
    async fn test_bad_request_is_attempted_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tokens"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad scope"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/tokens", server.uri());
        let response = client().send(|c| c.post(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_success_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "a"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/ok", server.uri());
        let response = client().send(|c| c.get(&url)).await.unwrap();
        let body: serde_json::Value = response.json("test").unwrap();

        assert!(response.is_success());
        assert_eq!(body["id"], "a");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let result = client()
            .send(|c| c.get("http://127.0.0.1:1/unreachable"))
            .await;

        assert!(matches!(result, Err(DomainError::Unavailable { .. })));
    }
}
