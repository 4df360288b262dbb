//! Slack OAuth token rotation through refresh-token exchange

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::config::{HttpConfig, ParameterSource};
use crate::domain::orchestrator::OrchestratorClient;
use crate::domain::{
    BackendConnector, Credential, CredentialBackend, CredentialId, CredentialPayload, DomainError,
    OutputParameter, PayloadSchema, TaskAction, TaskContext, ValueKind,
};
use crate::infrastructure::http_client::RetryingHttpClient;

const BACKEND: &str = "slack";
const PREVIOUS_REFRESH_TOKEN_FIELD: &str = "slack_refresh_token";

fn default_api_url() -> String {
    "https://slack.com/api".to_string()
}

/// `SM_<NAME>_VALUE` inputs of the Slack rotation provider
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SlackTokenParameters {
    #[serde(rename = "exchange_tokens_secret_id_value")]
    #[validate(length(min = 1))]
    pub exchange_tokens_secret_id: String,
    #[serde(rename = "api_url_value", default = "default_api_url")]
    #[validate(url)]
    pub api_url: String,
}

/// App credentials and the bootstrap tokens stored in the exchange secret
#[derive(Clone, Default, Deserialize)]
pub struct ExchangeTokens {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: String,
}

impl fmt::Debug for ExchangeTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeTokens")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RenewTokenResponse {
    ok: bool,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    error: Option<String>,
}

/// Rotates a Slack app token. Rotated tokens cannot be taken back, so revoke is a no-op.
pub struct SlackTokenBackend {
    http: RetryingHttpClient,
    api_url: String,
    exchange: ExchangeTokens,
    previous_refresh_token: Option<String>,
}

impl fmt::Debug for SlackTokenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackTokenBackend")
            .field("api_url", &self.api_url)
            .field("has_previous_refresh_token", &self.previous_refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

impl SlackTokenBackend {
    pub fn new(
        http: RetryingHttpClient,
        api_url: impl Into<String>,
        exchange: ExchangeTokens,
        previous_refresh_token: Option<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            exchange,
            previous_refresh_token,
        }
    }

    async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<(String, String), DomainError> {
        let url = format!("{}/oauth.v2.access", self.api_url);
        let form = [
            ("client_id", self.exchange.client_id.as_str()),
            ("client_secret", self.exchange.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.http.send(|c| c.post(&url).form(&form)).await?;

        if response.status().as_u16() != 200 {
            return Err(DomainError::rejected(
                BACKEND,
                format!("Request status error: {}", response.status().as_u16()),
            ));
        }

        let renewed: RenewTokenResponse = response.json(BACKEND)?;
        if !renewed.ok {
            return Err(DomainError::rejected(
                BACKEND,
                format!("Slack error: {}", renewed.error.unwrap_or_default()),
            ));
        }

        Ok((renewed.access_token, renewed.refresh_token))
    }
}

#[async_trait]
impl CredentialBackend for SlackTokenBackend {
    async fn create(&self, task: &TaskContext) -> Result<Credential, DomainError> {
        let bootstrap = self.exchange.refresh_token.as_str();
        let refresh_token = match self.previous_refresh_token.as_deref() {
            Some(previous) if !previous.is_empty() => previous,
            _ => {
                info!("Last refresh token not found, using the exchange secret refresh token");
                bootstrap
            }
        };

        let exchanged = self.exchange_refresh_token(refresh_token).await;
        let (access_token, new_refresh_token) = match exchanged {
            Ok(tokens) => tokens,
            Err(err) if refresh_token != bootstrap => {
                warn!(error = %err, "Retrying with the exchange secret refresh token");
                self.exchange_refresh_token(bootstrap).await?
            }
            Err(err) => return Err(err),
        };

        info!("Slack token rotated");

        Ok(Credential::new(
            CredentialId::new(task.secret_task_id()),
            CredentialPayload::new()
                .with_string("slack_access_token", access_token)
                .with_string("slack_refresh_token", new_refresh_token),
        ))
    }

    async fn revoke(&self, credential_id: &CredentialId) -> Result<(), DomainError> {
        info!(credentials_id = %credential_id, "Nothing to revoke for rotated Slack tokens");
        Ok(())
    }

    fn output_schema(&self) -> PayloadSchema {
        PayloadSchema::new(vec![
            OutputParameter::required("slack_access_token", ValueKind::String),
            OutputParameter::required("slack_refresh_token", ValueKind::String),
        ])
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[derive(Debug)]
pub struct SlackTokenConnector {
    parameters: ParameterSource,
    http: HttpConfig,
}

impl SlackTokenConnector {
    pub fn new(parameters: ParameterSource, http: HttpConfig) -> Self {
        Self { parameters, http }
    }

    /// Refresh token issued by the previous rotation, if the secret has versions
    async fn previous_refresh_token(
        orchestrator: &dyn OrchestratorClient,
        task: &TaskContext,
    ) -> Option<String> {
        let secret = match orchestrator.fetch_secret(task.secret_id()).await {
            Ok(secret) => secret,
            Err(err) => {
                warn!(error = %err, "Cannot read the current secret");
                return None;
            }
        };

        if secret.versions_total() == 0 {
            return None;
        }

        match secret.custom_credentials() {
            Ok(credentials) => credentials
                .get(PREVIOUS_REFRESH_TOKEN_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Err(err) => {
                warn!(error = %err, "Cannot read the previous refresh token");
                None
            }
        }
    }
}

#[async_trait]
impl BackendConnector for SlackTokenConnector {
    async fn connect(
        &self,
        orchestrator: &dyn OrchestratorClient,
        task: &TaskContext,
    ) -> Result<Box<dyn CredentialBackend>, DomainError> {
        let params: SlackTokenParameters = self.parameters.load()?;
        let http = RetryingHttpClient::new(BACKEND, self.http.timeout())?
            .with_retry_policy(self.http.retry_policy());

        // Deleting touches nothing in Slack
        if matches!(task.action(), TaskAction::Delete) {
            return Ok(Box::new(SlackTokenBackend::new(
                http,
                params.api_url,
                ExchangeTokens::default(),
                None,
            )));
        }

        let secret = orchestrator
            .fetch_secret(&params.exchange_tokens_secret_id)
            .await?;
        let exchange: ExchangeTokens =
            serde_json::from_str(secret.arbitrary_payload()?).map_err(|e| {
                DomainError::secret_fetch(
                    secret.id(),
                    format!("exchange tokens payload is not valid JSON: {}", e),
                )
            })?;

        let previous = Self::previous_refresh_token(orchestrator, task).await;

        Ok(Box::new(SlackTokenBackend::new(
            http,
            params.api_url,
            exchange,
            previous,
        )))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
