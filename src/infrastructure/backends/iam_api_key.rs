//! IAM user API keys, created locked and unlocked again before deletion

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use validator::Validate;

use crate::config::{HttpConfig, ParameterSource};
use crate::domain::orchestrator::{OrchestratorClient, Secret, SecretValue};
use crate::domain::{
    BackendConnector, Credential, CredentialBackend, CredentialId, CredentialPayload, DomainError,
    OutputParameter, PayloadSchema, TaskContext, ValueKind,
};
use crate::infrastructure::http_client::{BackendResponse, RetryingHttpClient};
use crate::infrastructure::iam_token::{IamTokenSource, IAM_PROD_URL};

const BACKEND: &str = "iam";

fn default_iam_url() -> String {
    IAM_PROD_URL.to_string()
}

/// `SM_<NAME>_VALUE` inputs of the IAM API key provider
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IamApiKeyParameters {
    #[serde(rename = "apikey_secret_id_value")]
    #[validate(length(min = 1))]
    pub apikey_secret_id: String,
    #[serde(rename = "url_value", default = "default_iam_url")]
    #[validate(url)]
    pub url: String,
    #[serde(rename = "iam_id_value")]
    #[validate(length(min = 1))]
    pub iam_id: String,
    #[serde(rename = "account_id_value")]
    #[validate(length(min = 1))]
    pub account_id: String,
    #[serde(rename = "support_sessions_value", default)]
    pub support_sessions: bool,
    #[serde(rename = "action_when_leaked_value", default)]
    pub action_when_leaked: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateApiKeyRequest<'a> {
    name: String,
    description: String,
    iam_id: &'a str,
    account_id: &'a str,
    support_sessions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_when_leaked: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyResponse {
    id: String,
    crn: String,
    iam_id: String,
    account_id: String,
    apikey: String,
}

#[derive(Debug, Default, Deserialize)]
struct IamErrorResponse {
    #[serde(default)]
    errors: Vec<IamError>,
}

#[derive(Debug, Deserialize)]
struct IamError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl IamErrorResponse {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn is_not_found(&self) -> bool {
        self.errors.len() == 1 && self.errors[0].code == "not_found"
    }
}

fn failure(response: &BackendResponse) -> DomainError {
    let parsed = IamErrorResponse::parse(response.body());
    let message = parsed
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| response.body().to_string());

    let message = format!("Status: {}. Error: {}", response.status().as_u16(), message);
    if response.status() == StatusCode::CONFLICT {
        DomainError::conflict(BACKEND, message)
    } else {
        DomainError::rejected(BACKEND, message)
    }
}

/// Issues and removes IAM API keys for one service identity
#[derive(Debug)]
pub struct IamApiKeyBackend {
    http: RetryingHttpClient,
    token: IamTokenSource,
    params: IamApiKeyParameters,
}

impl IamApiKeyBackend {
    pub fn new(
        http: RetryingHttpClient,
        token: IamTokenSource,
        params: IamApiKeyParameters,
    ) -> Self {
        Self {
            http,
            token,
            params,
        }
    }

    fn apikeys_url(&self) -> String {
        format!("{}/v1/apikeys", self.params.url.trim_end_matches('/'))
    }

    /// Unlocks the key; `false` when IAM does not know it
    async fn unlock(&self, credential_id: &CredentialId) -> Result<bool, DomainError> {
        let token = self.token.bearer_token().await?;
        let url = format!("{}/{}/unlock", self.apikeys_url(), credential_id);

        let response = self
            .http
            .send(|c| c.post(&url).bearer_auth(token))
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(true);
        }

        if response.status() == StatusCode::NOT_FOUND
            && IamErrorResponse::parse(response.body()).is_not_found()
        {
            return Ok(false);
        }

        Err(failure(&response))
    }
}

#[async_trait]
impl CredentialBackend for IamApiKeyBackend {
    async fn create(&self, task: &TaskContext) -> Result<Credential, DomainError> {
        let token = self.token.bearer_token().await?;
        let request = CreateApiKeyRequest {
            name: format!("{}-{}", task.secret_name(), task.task_id_suffix(6)),
            description: format!(
                "Created by Secrets Manager IAM user API Key provider for secret {} ({}) by {}",
                task.secret_name(),
                task.secret_id(),
                task.secret_task_id()
            ),
            iam_id: &self.params.iam_id,
            account_id: &self.params.account_id,
            support_sessions: self.params.support_sessions,
            action_when_leaked: self.params.action_when_leaked.as_deref(),
        };
        let url = self.apikeys_url();

        let response = self
            .http
            .send(|c| {
                c.post(&url)
                    .bearer_auth(token)
                    .header("Entity-Lock", "true")
                    .header("Entity-Disable", "false")
                    .json(&request)
            })
            .await?;

        if !response.is_success() {
            return Err(failure(&response));
        }

        let apikey: ApiKeyResponse = response.json(BACKEND)?;
        info!(credentials_id = %apikey.id, "IAM API key created");

        let payload = CredentialPayload::new()
            .with_string("apikey", apikey.apikey)
            .with_string("id", apikey.id.clone())
            .with_string("crn", apikey.crn)
            .with_string("iam_id", apikey.iam_id)
            .with_string("account_id", apikey.account_id);

        Ok(Credential::new(CredentialId::new(apikey.id), payload))
    }

    async fn revoke(&self, credential_id: &CredentialId) -> Result<(), DomainError> {
        if !self.unlock(credential_id).await? {
            debug!(credentials_id = %credential_id, "IAM API key does not exist");
            return Ok(());
        }

        let token = self.token.bearer_token().await?;
        let url = format!("{}/{}", self.apikeys_url(), credential_id);

        let response = self
            .http
            .send(|c| c.delete(&url).bearer_auth(token))
            .await?;

        if !response.is_success() {
            return Err(failure(&response));
        }

        info!(credentials_id = %credential_id, "IAM API key deleted");
        Ok(())
    }

    fn output_schema(&self) -> PayloadSchema {
        PayloadSchema::new(vec![
            OutputParameter::required("apikey", ValueKind::String),
            OutputParameter::required("id", ValueKind::String),
            OutputParameter::required("crn", ValueKind::String),
            OutputParameter::required("iam_id", ValueKind::String),
            OutputParameter::required("account_id", ValueKind::String),
        ])
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// API key used to call IAM, from an arbitrary secret or the `apikey` field
/// of a custom credentials secret
fn login_api_key(secret: &Secret) -> Result<String, DomainError> {
    match secret.value() {
        SecretValue::Arbitrary { payload } => Ok(payload.clone()),
        SecretValue::CustomCredentials { credentials, .. } => match credentials.get("apikey") {
            Some(Value::String(apikey)) => Ok(apikey.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(DomainError::secret_fetch(
                secret.id(),
                "secret is missing 'apikey' field",
            )),
        },
        other => Err(DomainError::secret_type(
            secret.id(),
            "arbitrary or custom_credentials",
            other.type_name(),
        )),
    }
}

#[derive(Debug)]
pub struct IamApiKeyConnector {
    parameters: ParameterSource,
    http: HttpConfig,
}

impl IamApiKeyConnector {
    pub fn new(parameters: ParameterSource, http: HttpConfig) -> Self {
        Self { parameters, http }
    }
}

#[async_trait]
impl BackendConnector for IamApiKeyConnector {
    async fn connect(
        &self,
        orchestrator: &dyn OrchestratorClient,
        _task: &TaskContext,
    ) -> Result<Box<dyn CredentialBackend>, DomainError> {
        let params: IamApiKeyParameters = self.parameters.load()?;

        info!(secret_id = %params.apikey_secret_id, "Obtaining IAM login secret");
        let secret = orchestrator.fetch_secret(&params.apikey_secret_id).await?;
        let apikey = login_api_key(&secret)?;

        let token = IamTokenSource::new(&params.url, apikey, self.http.timeout())?;
        let http = RetryingHttpClient::new(BACKEND, self.http.timeout())?
            .with_retry_policy(self.http.retry_policy());

        Ok(Box::new(IamApiKeyBackend::new(http, token, params)))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orchestrator::MockOrchestratorClient;
    use crate::domain::{RetryPolicy, TaskAction};
    use serde_json::{json, Map};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn iam_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "iam-bearer"})),
            )
            .mount(&server)
            .await;
        server
    }

    fn params(url: String) -> IamApiKeyParameters {
        IamApiKeyParameters {
            apikey_secret_id: "login".to_string(),
            url,
            iam_id: "iam-ServiceId-1".to_string(),
            account_id: "account-1".to_string(),
            support_sessions: false,
            action_when_leaked: None,
        }
    }

    fn backend(server: &MockServer) -> IamApiKeyBackend {
        let timeout = Duration::from_secs(5);
        let http = RetryingHttpClient::new(BACKEND, timeout).unwrap().with_retry_policy(
            RetryPolicy::new(3)
                .with_min_wait(Duration::from_millis(1))
                .with_max_wait(Duration::from_millis(2)),
        );
        let token = IamTokenSource::new(server.uri(), "login-key", timeout).unwrap();
        IamApiKeyBackend::new(http, token, params(server.uri()))
    }

    fn task() -> TaskContext {
        TaskContext::new("secret-1", "0b5571f7-21e6-42b7-91c5-3f5ac9793a46", TaskAction::Create)
            .with_secret_name("ci-key")
    }

    #[tokio::test]
    async fn test_create_locked_api_key() {
        let server = iam_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/apikeys"))
            .and(header("Entity-Lock", "true"))
            .and(header("Authorization", "Bearer iam-bearer"))
            .and(body_partial_json(json!({
                "name": "ci-key-793a46",
                "iam_id": "iam-ServiceId-1",
                "account_id": "account-1",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "ApiKey-1",
                "crn": "crn:v1:apikey",
                "iam_id": "iam-ServiceId-1",
                "account_id": "account-1",
                "apikey": "secret-value",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let credential = backend.create(&task()).await.unwrap();

        assert_eq!(credential.id().as_str(), "ApiKey-1");
        assert!(backend.output_schema().validate(credential.payload()).is_ok());
    }

    #[tokio::test]
    async fn test_revoke_unlocks_then_deletes() {
        let server = iam_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/apikeys/ApiKey-1/unlock"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/apikeys/ApiKey-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server).revoke(&CredentialId::new("ApiKey-1")).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_unknown_key_is_noop() {
        let server = iam_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/apikeys/ApiKey-gone/unlock"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errors": [{"code": "not_found", "message": "API key not found"}]
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/apikeys/ApiKey-gone"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let id = CredentialId::new("ApiKey-gone");

        assert!(backend.revoke(&id).await.is_ok());
        assert!(backend.revoke(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejected() {
        let server = iam_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/apikeys"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{"code": "invalid_iam_id", "message": "iam_id is invalid"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = backend(&server).create(&task()).await.unwrap_err();

        assert!(matches!(err, DomainError::Rejected { .. }));
        assert!(err.to_string().contains("iam_id is invalid"));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let server = iam_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/apikeys"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "errors": [{"code": "conflict", "message": "API key name already in use"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = backend(&server).create(&task()).await.unwrap_err();

        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(err.to_string().contains("Status: 409"));
    }

    #[test]
    fn test_login_api_key_from_custom_credentials() {
        let mut credentials = Map::new();
        credentials.insert("apikey".to_string(), json!("from-custom"));
        let secret = Secret::new(
            "login",
            SecretValue::CustomCredentials {
                credentials,
                versions_total: 1,
            },
        );

        assert_eq!(login_api_key(&secret).unwrap(), "from-custom");
    }

    #[test]
    fn test_login_api_key_missing_field() {
        let secret = Secret::new(
            "login",
            SecretValue::CustomCredentials {
                credentials: Map::new(),
                versions_total: 1,
            },
        );

        let err = login_api_key(&secret).unwrap_err();
        assert!(err.to_string().contains("'apikey'"));
    }

    #[tokio::test]
    async fn test_connect_with_wrong_secret_type() {
        let source = ParameterSource::from_map([
            ("SM_APIKEY_SECRET_ID_VALUE", "login"),
            ("SM_IAM_ID_VALUE", "iam-ServiceId-1"),
            ("SM_ACCOUNT_ID_VALUE", "account-1"),
        ]);
        let mut orchestrator = MockOrchestratorClient::new();
        orchestrator
            .expect_fetch_secret()
            .withf(|id| id == "login")
            .times(1)
            .returning(|id| {
                Ok(Secret::new(
                    id,
                    SecretValue::Other {
                        secret_type: "kv".to_string(),
                    },
                ))
            });

        let connector = IamApiKeyConnector::new(source, HttpConfig::default());
        let err = connector.connect(&orchestrator, &task()).await.unwrap_err();

        assert!(matches!(err, DomainError::SecretType { .. }));
    }

    #[tokio::test]
    async fn test_connect_with_missing_parameters() {
        let orchestrator = MockOrchestratorClient::new();
        let connector = IamApiKeyConnector::new(
            ParameterSource::from_map([("SM_IAM_ID_VALUE", "iam-ServiceId-1")]),
            HttpConfig::default(),
        );

        let err = connector.connect(&orchestrator, &task()).await.unwrap_err();

        assert_eq!(
            err.setup_error_code(),
            crate::domain::ErrorCode::InvalidParameters
        );
    }
}
