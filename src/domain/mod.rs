//! Domain layer - tasks, credentials, the orchestrator seam and the saga

pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod saga;
pub mod task;

pub use credentials::{
    BackendConnector, Credential, CredentialBackend, CredentialId, CredentialPayload,
    OutputParameter, PayloadSchema, PayloadValue, ValueKind,
};
pub use error::{DomainError, ErrorCode};
pub use orchestrator::{OrchestratorClient, Secret, SecretValue, TaskAcknowledgement};
pub use retry::RetryPolicy;
pub use saga::{Dispatcher, Outcome, ProvisioningSaga, SagaState};
pub use task::{TaskAction, TaskContext};
