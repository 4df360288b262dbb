//! IAM API key to bearer token exchange

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::domain::DomainError;

pub const IAM_PROD_URL: &str = "https://iam.cloud.ibm.com";
pub const IAM_TEST_URL: &str = "https://iam.test.cloud.ibm.com";
const TEST_INSTANCE_DOMAIN: &str = "secrets-manager.test.appdomain.cloud";
const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// IAM endpoint matching the environment a Secrets Manager instance lives in
pub fn iam_url_for(instance_url: &str) -> &'static str {
    if instance_url.contains(TEST_INSTANCE_DOMAIN) {
        IAM_TEST_URL
    } else {
        IAM_PROD_URL
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges an API key once and hands out the bearer token afterwards
pub struct IamTokenSource {
    client: Client,
    iam_url: String,
    apikey: String,
    token: OnceCell<String>,
}

impl fmt::Debug for IamTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamTokenSource")
            .field("iam_url", &self.iam_url)
            .finish_non_exhaustive()
    }
}

impl IamTokenSource {
    pub fn new(
        iam_url: impl Into<String>,
        apikey: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::backend_init("iam", format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            iam_url: iam_url.into().trim_end_matches('/').to_string(),
            apikey: apikey.into(),
            token: OnceCell::new(),
        })
    }

    /// Returns the bearer token, exchanging the API key on first use
    pub async fn bearer_token(&self) -> Result<&str, DomainError> {
        self.token
            .get_or_try_init(|| self.exchange())
            .await
            .map(String::as_str)
    }

    async fn exchange(&self) -> Result<String, DomainError> {
        let url = format!("{}/identity/token", self.iam_url);

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", APIKEY_GRANT_TYPE),
                ("apikey", self.apikey.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DomainError::unavailable("iam", format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::rejected(
                "iam",
                format!("Token request returned status {}: {}", status.as_u16(), body),
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            DomainError::rejected("iam", format!("Failed to parse token response: {}", e))
        })?;

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_iam_url_selection() {
        assert_eq!(
            iam_url_for("https://abc.us-south.secrets-manager.test.appdomain.cloud"),
            IAM_TEST_URL
        );
        assert_eq!(
            iam_url_for("https://abc.us-south.secrets-manager.appdomain.cloud"),
            IAM_PROD_URL
        );
    }

    #[tokio::test]
    async fn test_token_is_exchanged_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .and(body_string_contains("apikey=my-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "bearer-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = IamTokenSource::new(server.uri(), "my-key", Duration::from_secs(5)).unwrap();

        assert_eq!(source.bearer_token().await.unwrap(), "bearer-1");
        assert_eq!(source.bearer_token().await.unwrap(), "bearer-1");
    }

    #[tokio::test]
    async fn test_rejected_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("BXNIM0415E"))
            .mount(&server)
            .await;

        let source = IamTokenSource::new(server.uri(), "bad", Duration::from_secs(5)).unwrap();
        let err = source.bearer_token().await.unwrap_err();

        assert!(err.to_string().contains("BXNIM0415E"));
    }
}
