//! Orchestrator client - the secrets-lifecycle service that hands out tasks

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::credentials::Credential;
use super::error::ErrorCode;
use super::{DomainError, TaskContext};

#[cfg(test)]
use mockall::automock;

/// Content of a secret fetched from the orchestrator
#[derive(Clone)]
pub enum SecretValue {
    /// Opaque string payload
    Arbitrary { payload: String },
    /// Key/value credentials, with the number of versions the secret has
    CustomCredentials {
        credentials: Map<String, Value>,
        versions_total: u64,
    },
    /// Service credentials document
    ServiceCredentials { credentials: Value },
    /// User name and password pair
    UsernamePassword { username: String, password: String },
    /// Any type this crate does not consume
    Other { secret_type: String },
}

impl SecretValue {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Arbitrary { .. } => "arbitrary",
            Self::CustomCredentials { .. } => "custom_credentials",
            Self::ServiceCredentials { .. } => "service_credentials",
            Self::UsernamePassword { .. } => "username_password",
            Self::Other { secret_type } => secret_type,
        }
    }
}

/// Secret fetched by id
#[derive(Clone)]
pub struct Secret {
    id: String,
    value: SecretValue,
}

impl Secret {
    pub fn new(id: impl Into<String>, value: SecretValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> &SecretValue {
        &self.value
    }

    pub fn arbitrary_payload(&self) -> Result<&str, DomainError> {
        match &self.value {
            SecretValue::Arbitrary { payload } => Ok(payload),
            other => Err(self.type_mismatch("arbitrary", other)),
        }
    }

    pub fn custom_credentials(&self) -> Result<&Map<String, Value>, DomainError> {
        match &self.value {
            SecretValue::CustomCredentials { credentials, .. } => Ok(credentials),
            other => Err(self.type_mismatch("custom_credentials", other)),
        }
    }

    pub fn service_credentials(&self) -> Result<&Value, DomainError> {
        match &self.value {
            SecretValue::ServiceCredentials { credentials } => Ok(credentials),
            other => Err(self.type_mismatch("service_credentials", other)),
        }
    }

    pub fn versions_total(&self) -> u64 {
        match &self.value {
            SecretValue::CustomCredentials { versions_total, .. } => *versions_total,
            _ => 0,
        }
    }

    fn type_mismatch(&self, expected: &str, actual: &SecretValue) -> DomainError {
        DomainError::secret_type(&self.id, expected, actual.type_name())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("type", &self.value.type_name())
            .finish_non_exhaustive()
    }
}

/// Orchestrator's answer to a task update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskAcknowledgement {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Operations the jobs need from the orchestrator.
///
/// Reports are never retried: a failed report is terminal for the run.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Fetches a secret by id
    async fn fetch_secret(&self, secret_id: &str) -> Result<Secret, DomainError>;

    /// Marks the task as `credentials_created` with the new credential
    async fn report_created(
        &self,
        task: &TaskContext,
        credential: &Credential,
    ) -> Result<TaskAcknowledgement, DomainError>;

    /// Marks the task as `credentials_deleted`
    async fn report_deleted(&self, task: &TaskContext)
        -> Result<TaskAcknowledgement, DomainError>;

    /// Marks the task as `failed` with a single `{code, description}` entry
    async fn report_failed(
        &self,
        task: &TaskContext,
        code: ErrorCode,
        description: &str,
    ) -> Result<TaskAcknowledgement, DomainError>;
}
