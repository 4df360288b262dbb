//! Create-then-report with compensation, and revoke-then-report

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{Outcome, SagaState};
use crate::domain::credentials::{BackendConnector, CredentialBackend, CredentialId};
use crate::domain::error::ErrorCode;
use crate::domain::orchestrator::OrchestratorClient;
use crate::domain::{DomainError, TaskContext};

/// Drives one backend through a create or delete run
#[derive(Clone)]
pub struct ProvisioningSaga {
    orchestrator: Arc<dyn OrchestratorClient>,
    connector: Arc<dyn BackendConnector>,
}

impl std::fmt::Debug for ProvisioningSaga {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningSaga")
            .field("backend", &self.connector.backend_name())
            .finish_non_exhaustive()
    }
}

impl ProvisioningSaga {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorClient>,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        Self {
            orchestrator,
            connector,
        }
    }

    /// Creates a credential and reports it, revoking it again if the report fails
    pub async fn create(&self, mut task: TaskContext) -> Outcome {
        transition(SagaState::Start);

        let backend = match self.connector.connect(self.orchestrator.as_ref(), &task).await {
            Ok(backend) => backend,
            Err(err) => {
                error!(error = %err, "Cannot prepare backend");
                return self.fail(&task, err.setup_error_code(), &err.to_string()).await;
            }
        };

        let credential = match backend.create(&task).await {
            Ok(credential) => credential,
            Err(err) => {
                transition(SagaState::CreateFailed);
                error!(backend = backend.backend_name(), error = %err, "Cannot create credentials");
                return self
                    .fail(&task, ErrorCode::CreateFailed, &err.to_string())
                    .await;
            }
        };

        transition(SagaState::Created);
        task.record_credentials_id(credential.id().clone());
        info!(credentials_id = %credential.id(), "Credentials created");

        let reported = match backend.output_schema().validate(credential.payload()) {
            Ok(()) => self.orchestrator.report_created(&task, &credential).await,
            Err(err) => Err(err),
        };

        match reported {
            Ok(ack) => {
                transition(SagaState::ReportedOk);
                info!(
                    credentials_id = %credential.id(),
                    updated_at = ?ack.updated_at,
                    "Secret task updated with new credentials"
                );
                Outcome::Succeeded {
                    credential_id: credential.id().clone(),
                }
            }
            Err(report_err) => {
                transition(SagaState::ReportFailed);
                error!(error = %report_err, "Cannot report created credentials");
                self.compensate(&task, backend.as_ref(), credential.id(), report_err)
                    .await
            }
        }
    }

    /// Revokes the credential named by the task and reports the deletion
    pub async fn delete(&self, task: TaskContext) -> Outcome {
        transition(SagaState::Start);

        let Some(credential_id) = task.credentials_id().cloned() else {
            let err =
                DomainError::configuration("credentials id is required to delete credentials");
            return self.fail(&task, ErrorCode::InvalidParameters, &err.to_string()).await;
        };

        let backend = match self.connector.connect(self.orchestrator.as_ref(), &task).await {
            Ok(backend) => backend,
            Err(err) => {
                error!(error = %err, "Cannot prepare backend");
                return self.fail(&task, err.setup_error_code(), &err.to_string()).await;
            }
        };

        if let Err(err) = backend.revoke(&credential_id).await {
            error!(
                backend = backend.backend_name(),
                credentials_id = %credential_id,
                error = %err,
                "Cannot delete credentials"
            );
            return self.fail(&task, ErrorCode::DeleteFailed, &err.to_string()).await;
        }

        transition(SagaState::Revoked);
        info!(credentials_id = %credential_id, "Credentials deleted");

        match self.orchestrator.report_deleted(&task).await {
            Ok(_) => {
                transition(SagaState::ReportedOk);
                Outcome::Succeeded { credential_id }
            }
            Err(err) => {
                transition(SagaState::Fatal);
                error!(error = %err, "Cannot report deleted credentials");
                Outcome::Fatal {
                    description: err.to_string(),
                }
            }
        }
    }

    /// Reports an action that is neither create nor delete
    pub async fn reject_unknown_action(&self, task: TaskContext) -> Outcome {
        let err = DomainError::unknown_action(task.action().as_str());
        error!(error = %err, "Unknown action");
        self.fail(&task, ErrorCode::UnknownAction, &err.to_string()).await
    }

    async fn compensate(
        &self,
        task: &TaskContext,
        backend: &dyn CredentialBackend,
        credential_id: &CredentialId,
        report_err: DomainError,
    ) -> Outcome {
        match backend.revoke(credential_id).await {
            Ok(()) => {
                transition(SagaState::Compensated);
                warn!(credentials_id = %credential_id, "Credentials rolled back");
                let description = format!(
                    "{}. The credentials '{}' were rolled back",
                    report_err, credential_id
                );
                self.fail(task, ErrorCode::ReportFailedRolledBack, &description)
                    .await
            }
            Err(revoke_err) => {
                transition(SagaState::CompensationFailed);
                error!(
                    credentials_id = %credential_id,
                    report_error = %report_err,
                    rollback_error = %revoke_err,
                    "Cannot roll back credentials"
                );
                transition(SagaState::Fatal);
                Outcome::Fatal {
                    description: format!(
                        "{}. Rolling back credentials '{}' failed: {}",
                        report_err, credential_id, revoke_err
                    ),
                }
            }
        }
    }

    async fn fail(&self, task: &TaskContext, code: ErrorCode, description: &str) -> Outcome {
        match self.orchestrator.report_failed(task, code, description).await {
            Ok(_) => {
                transition(SagaState::ReportedError);
                Outcome::Failed {
                    code,
                    description: description.to_string(),
                }
            }
            Err(err) => {
                transition(SagaState::Fatal);
                error!(code = %code, error = %err, "Cannot report failure");
                Outcome::Fatal {
                    description: format!("{}: {}. Reporting it failed: {}", code, description, err),
                }
            }
        }
    }
}

fn transition(state: SagaState) {
    tracing::debug!(state = %state, "Saga transition");
}
