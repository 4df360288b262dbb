//! JFrog Access scoped tokens

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use crate::config::{HttpConfig, ParameterSource};
use crate::domain::orchestrator::{OrchestratorClient, Secret, SecretValue};
use crate::domain::{
    BackendConnector, Credential, CredentialBackend, CredentialId, CredentialPayload, DomainError,
    OutputParameter, PayloadSchema, TaskContext, ValueKind,
};
use crate::infrastructure::http_client::{BackendResponse, RetryingHttpClient};

const BACKEND: &str = "jfrog";
const TOKENS_PATH: &str = "/access/api/v1/tokens/";

fn default_scope() -> String {
    "applied-permissions/user".to_string()
}

fn default_expires_in() -> u64 {
    // 90 days
    7_776_000
}

fn default_audience() -> String {
    "*@*".to_string()
}

/// `SM_<NAME>_VALUE` inputs of the JFrog token provider
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JfrogTokenParameters {
    #[serde(rename = "login_secret_id_value")]
    #[validate(length(min = 1))]
    pub login_secret_id: String,
    #[serde(rename = "jfrog_base_url_value")]
    #[validate(url)]
    pub base_url: String,
    #[serde(rename = "username_value", default)]
    pub username: String,
    #[serde(rename = "scope_value", default = "default_scope")]
    #[validate(length(min = 1))]
    pub scope: String,
    #[serde(rename = "expires_in_seconds_value", default = "default_expires_in")]
    #[validate(range(min = 1))]
    pub expires_in: u64,
    #[serde(rename = "refreshable_value", default)]
    pub refreshable: bool,
    #[serde(rename = "description_value", default)]
    pub description: String,
    #[serde(rename = "audience_value", default = "default_audience")]
    pub audience: String,
    #[serde(rename = "include_reference_token_value", default)]
    pub include_reference_token: bool,
    #[serde(rename = "grant_type_value", default)]
    pub grant_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateTokenRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    grant_type: Option<&'a str>,
    username: &'a str,
    scope: &'a str,
    expires_in: u64,
    refreshable: bool,
    description: &'a str,
    audience: &'a str,
    include_reference_token: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct JfrogErrorResponse {
    #[serde(default)]
    errors: Vec<JfrogError>,
}

#[derive(Debug, Deserialize)]
struct JfrogError {
    #[serde(default)]
    message: String,
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<JfrogErrorResponse>(body) {
        Ok(parsed) => parsed
            .errors
            .into_iter()
            .next()
            .map(|e| e.message)
            .unwrap_or_else(|| "error details were not provided by JFrog".to_string()),
        Err(e) => format!("error unmarshaling JFrog response body: {}", e),
    }
}

fn failure(response: &BackendResponse) -> DomainError {
    let message = format!(
        "Status: {}. Error: {}",
        response.status().as_u16(),
        error_message(response.body())
    );
    if response.status() == StatusCode::CONFLICT {
        DomainError::conflict(BACKEND, message)
    } else {
        DomainError::rejected(BACKEND, message)
    }
}

/// Creates and revokes access tokens with an admin bearer token
#[derive(Debug)]
pub struct JfrogTokenBackend {
    http: RetryingHttpClient,
    bearer_token: String,
    params: JfrogTokenParameters,
}

impl JfrogTokenBackend {
    pub fn new(
        http: RetryingHttpClient,
        bearer_token: impl Into<String>,
        params: JfrogTokenParameters,
    ) -> Self {
        Self {
            http,
            bearer_token: bearer_token.into(),
            params,
        }
    }

    fn tokens_url(&self) -> String {
        format!("{}{}", self.params.base_url.trim_end_matches('/'), TOKENS_PATH)
    }
}

#[async_trait]
impl CredentialBackend for JfrogTokenBackend {
    async fn create(&self, _task: &TaskContext) -> Result<Credential, DomainError> {
        let request = CreateTokenRequest {
            grant_type: self.params.grant_type.as_deref(),
            username: &self.params.username,
            scope: &self.params.scope,
            expires_in: self.params.expires_in,
            refreshable: self.params.refreshable,
            description: &self.params.description,
            audience: &self.params.audience,
            include_reference_token: self.params.include_reference_token,
        };
        let url = self.tokens_url();

        let response = self
            .http
            .send(|c| c.post(&url).bearer_auth(&self.bearer_token).json(&request))
            .await?;

        if !response.is_success() {
            return Err(failure(&response));
        }

        let token: TokenResponse = response.json(BACKEND)?;
        info!(credentials_id = %token.token_id, "Access token created");

        Ok(Credential::new(
            CredentialId::new(token.token_id),
            CredentialPayload::new().with_string("access_token", token.access_token),
        ))
    }

    async fn revoke(&self, credential_id: &CredentialId) -> Result<(), DomainError> {
        let url = format!("{}{}", self.tokens_url(), credential_id);

        let response = self
            .http
            .send(|c| c.delete(&url).bearer_auth(&self.bearer_token))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(credentials_id = %credential_id, "Access token does not exist");
            return Ok(());
        }

        if !response.is_success() {
            return Err(failure(&response));
        }

        info!(credentials_id = %credential_id, "Access token revoked");
        Ok(())
    }

    fn output_schema(&self) -> PayloadSchema {
        PayloadSchema::new(vec![OutputParameter::required("access_token", ValueKind::String)])
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Admin token from an arbitrary secret, or the password of a user credentials secret
fn login_token(secret: &Secret) -> Result<String, DomainError> {
    match secret.value() {
        SecretValue::Arbitrary { payload } => Ok(payload.clone()),
        SecretValue::UsernamePassword { password, .. } => Ok(password.clone()),
        other => Err(DomainError::secret_type(
            secret.id(),
            "arbitrary or username_password",
            other.type_name(),
        )),
    }
}

#[derive(Debug)]
pub struct JfrogTokenConnector {
    parameters: ParameterSource,
    http: HttpConfig,
}

impl JfrogTokenConnector {
    pub fn new(parameters: ParameterSource, http: HttpConfig) -> Self {
        Self { parameters, http }
    }
}

#[async_trait]
impl BackendConnector for JfrogTokenConnector {
    async fn connect(
        &self,
        orchestrator: &dyn OrchestratorClient,
        _task: &TaskContext,
    ) -> Result<Box<dyn CredentialBackend>, DomainError> {
        let params: JfrogTokenParameters = self.parameters.load()?;

        info!(secret_id = %params.login_secret_id, "Obtaining JFrog login secret");
        let secret = orchestrator.fetch_secret(&params.login_secret_id).await?;
        let token = login_token(&secret)?;

        let http = RetryingHttpClient::new(BACKEND, self.http.timeout())?
            .with_retry_policy(self.http.retry_policy());

        Ok(Box::new(JfrogTokenBackend::new(http, token, params)))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
