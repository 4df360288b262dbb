use async_trait::async_trait;
use std::fmt::Debug;

use super::{Credential, CredentialId, PayloadSchema};
use crate::domain::orchestrator::OrchestratorClient;
use crate::domain::{DomainError, TaskContext};

/// Third-party system able to create and revoke one kind of credential
#[async_trait]
pub trait CredentialBackend: Send + Sync + Debug {
    /// Allocate a new credential. Called at most once per run.
    async fn create(&self, task: &TaskContext) -> Result<Credential, DomainError>;

    /// Remove a credential. Unknown identifiers succeed as a no-op.
    async fn revoke(&self, credential_id: &CredentialId) -> Result<(), DomainError>;

    /// Output parameters the created payload must satisfy
    fn output_schema(&self) -> PayloadSchema;

    /// Backend name for logging/debugging
    fn backend_name(&self) -> &'static str;
}

/// Resolves backend parameters (including login secrets) into a ready backend
#[async_trait]
pub trait BackendConnector: Send + Sync + Debug {
    async fn connect(
        &self,
        orchestrator: &dyn OrchestratorClient,
        task: &TaskContext,
    ) -> Result<Box<dyn CredentialBackend>, DomainError>;

    fn backend_name(&self) -> &'static str;
}
