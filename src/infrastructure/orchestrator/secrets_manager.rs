use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::orchestrator::{OrchestratorClient, Secret, SecretValue, TaskAcknowledgement};
use crate::domain::{Credential, DomainError, ErrorCode, TaskContext};
use crate::infrastructure::iam_token::IamTokenSource;

const STATUS_CREDENTIALS_CREATED: &str = "credentials_created";
const STATUS_CREDENTIALS_DELETED: &str = "credentials_deleted";
const STATUS_FAILED: &str = "failed";

#[derive(Deserialize)]
struct SecretResource {
    secret_type: String,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    credentials: Option<Value>,
    #[serde(default)]
    versions_total: Option<u64>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl SecretResource {
    fn into_value(self) -> SecretValue {
        match self.secret_type.as_str() {
            "arbitrary" => SecretValue::Arbitrary {
                payload: match self.payload {
                    Some(Value::String(payload)) => payload,
                    Some(other) => other.to_string(),
                    None => String::new(),
                },
            },
            "custom_credentials" => SecretValue::CustomCredentials {
                credentials: match self.credentials {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                },
                versions_total: self.versions_total.unwrap_or_default(),
            },
            "service_credentials" => SecretValue::ServiceCredentials {
                credentials: self.credentials.unwrap_or(Value::Null),
            },
            "username_password" => SecretValue::UsernamePassword {
                username: self.username.unwrap_or_default(),
                password: self.password.unwrap_or_default(),
            },
            _ => SecretValue::Other {
                secret_type: self.secret_type,
            },
        }
    }
}

/// Secrets Manager v2 REST client. Calls are never retried.
#[derive(Debug)]
pub struct SecretsManagerClient {
    client: Client,
    instance_url: String,
    token: IamTokenSource,
}

impl SecretsManagerClient {
    pub fn new(
        instance_url: impl Into<String>,
        token: IamTokenSource,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn update_task(
        &self,
        task: &TaskContext,
        body: Value,
    ) -> Result<TaskAcknowledgement, DomainError> {
        let context = format!(
            "cannot update secret with ID: '{}' task with ID: '{}'",
            task.secret_id(),
            task.secret_task_id()
        );
        let token = self
            .token
            .bearer_token()
            .await
            .map_err(|e| DomainError::report(format!("{}. {}", context, e)))?;

        let url = format!(
            "{}/api/v2/secrets/{}/tasks/{}",
            self.instance_url,
            task.secret_id(),
            task.secret_task_id()
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::report(format!("{}. error: {}", context, e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.as_u16() != 200 {
            return Err(DomainError::report(format!(
                "{}. status code is: '{}', response is {}",
                context,
                status.as_u16(),
                text
            )));
        }

        debug!(status = body["status"].as_str(), "Secret task updated");
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }
}

#[async_trait]
impl OrchestratorClient for SecretsManagerClient {
    async fn fetch_secret(&self, secret_id: &str) -> Result<Secret, DomainError> {
        let token = self
            .token
            .bearer_token()
            .await
            .map_err(|e| DomainError::secret_fetch(secret_id, e.to_string()))?;

        let url = format!("{}/api/v2/secrets/{}", self.instance_url, secret_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DomainError::secret_fetch(secret_id, e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::secret_fetch(
                secret_id,
                format!("unexpected status code {}: {}", status.as_u16(), body),
            ));
        }

        let resource: SecretResource = response.json().await.map_err(|e| {
            DomainError::secret_fetch(secret_id, format!("Failed to parse secret: {}", e))
        })?;

        Ok(Secret::new(secret_id, resource.into_value()))
    }

    async fn report_created(
        &self,
        task: &TaskContext,
        credential: &Credential,
    ) -> Result<TaskAcknowledgement, DomainError> {
        let body = json!({
            "status": STATUS_CREDENTIALS_CREATED,
            "credentials": {
                "id": credential.id(),
                "payload": credential.payload(),
            },
        });
        self.update_task(task, body).await
    }

    async fn report_deleted(&self, task: &TaskContext) -> Result<TaskAcknowledgement, DomainError> {
        self.update_task(task, json!({ "status": STATUS_CREDENTIALS_DELETED }))
            .await
    }

    async fn report_failed(
        &self,
        task: &TaskContext,
        code: ErrorCode,
        description: &str,
    ) -> Result<TaskAcknowledgement, DomainError> {
        let body = json!({
            "status": STATUS_FAILED,
            "errors": [{ "code": code.as_str(), "description": description }],
        });
        self.update_task(task, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialId, CredentialPayload, TaskAction};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_token() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "bearer-1"})),
            )
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer) -> SecretsManagerClient {
        let token =
            IamTokenSource::new(server.uri(), "access-key", Duration::from_secs(5)).unwrap();
        SecretsManagerClient::new(server.uri(), token, Duration::from_secs(5)).unwrap()
    }

    fn task() -> TaskContext {
        TaskContext::new("secret-1", "task-1", TaskAction::Create)
    }

    #[tokio::test]
    async fn test_fetch_arbitrary_secret() {
        let server = server_with_token().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/secrets/login-1"))
            .and(header("Authorization", "Bearer bearer-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "login-1",
                "secret_type": "arbitrary",
                "payload": "jfrog-admin-token",
            })))
            .mount(&server)
            .await;

        let secret = client(&server).fetch_secret("login-1").await.unwrap();

        assert_eq!(secret.arbitrary_payload().unwrap(), "jfrog-admin-token");
    }

    #[tokio::test]
    async fn test_fetch_custom_credentials_secret() {
        let server = server_with_token().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/secrets/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secret_type": "custom_credentials",
                "versions_total": 3,
                "credentials": {"slack_refresh_token": "xoxe-1"},
            })))
            .mount(&server)
            .await;

        let secret = client(&server).fetch_secret("current").await.unwrap();

        assert_eq!(secret.versions_total(), 3);
        assert_eq!(
            secret.custom_credentials().unwrap()["slack_refresh_token"],
            "xoxe-1"
        );
    }

    #[tokio::test]
    async fn test_fetch_missing_secret() {
        let server = server_with_token().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/secrets/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_secret("missing").await.unwrap_err();

        assert!(matches!(err, DomainError::SecretFetch { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_report_created_body() {
        let server = server_with_token().await;
        Mock::given(method("PUT"))
            .and(path("/api/v2/secrets/secret-1/tasks/task-1"))
            .and(body_json(json!({
                "status": "credentials_created",
                "credentials": {"id": "token-1", "payload": {"access_token": "abc"}},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "credentials_created",
                "updated_at": "2024-05-01T10:00:00Z",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = Credential::new(
            CredentialId::new("token-1"),
            CredentialPayload::new().with_string("access_token", "abc"),
        );
        let ack = client(&server)
            .report_created(&task(), &credential)
            .await
            .unwrap();

        assert!(ack.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_report_failed_body() {
        let server = server_with_token().await;
        Mock::given(method("PUT"))
            .and(path("/api/v2/secrets/secret-1/tasks/task-1"))
            .and(body_json(json!({
                "status": "failed",
                "errors": [{"code": "Err10003", "description": "boom"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server)
            .report_failed(&task(), ErrorCode::CreateFailed, "boom")
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_report_rejected_by_orchestrator() {
        let server = server_with_token().await;
        Mock::given(method("PUT"))
            .and(path("/api/v2/secrets/secret-1/tasks/task-1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).report_deleted(&task()).await.unwrap_err();

        assert!(matches!(err, DomainError::Report { .. }));
        assert!(err.to_string().contains("'503'"));
    }
}
