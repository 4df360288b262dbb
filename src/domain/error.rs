use std::fmt;

use thiserror::Error;

/// Stable failure codes reported to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The action selector is neither create nor delete
    UnknownAction,
    /// The referenced login secret could not be fetched or has the wrong type
    LoginSecretUnavailable,
    /// The backend client could not be initialized
    BackendInitFailed,
    /// The backend rejected or could not complete the create call
    CreateFailed,
    /// The backend rejected or could not complete the revoke call
    DeleteFailed,
    /// Reporting the new credential failed and the credential was rolled back
    ReportFailedRolledBack,
    /// Provider parameters are missing or invalid
    InvalidParameters,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownAction => "Err10000",
            Self::LoginSecretUnavailable => "Err10001",
            Self::BackendInitFailed => "Err10002",
            Self::CreateFailed => "Err10003",
            Self::DeleteFailed => "Err10004",
            Self::ReportFailedRolledBack => "Err10005",
            Self::InvalidParameters => "Err10006",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown action: '{action}'")]
    UnknownAction { action: String },

    #[error("Cannot fetch secret '{secret_id}': {message}")]
    SecretFetch { secret_id: String, message: String },

    #[error("Secret '{secret_id}' has unexpected type '{actual}', expected {expected}")]
    SecretType {
        secret_id: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot initialize {backend} client: {message}")]
    BackendInit { backend: String, message: String },

    #[error("{backend} is unavailable: {message}")]
    Unavailable { backend: String, message: String },

    #[error("{backend} rejected the request: {message}")]
    Rejected { backend: String, message: String },

    #[error("{backend} reported a conflict: {message}")]
    Conflict { backend: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Cannot update secret task: {message}")]
    Report { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    pub fn secret_fetch(secret_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SecretFetch {
            secret_id: secret_id.into(),
            message: message.into(),
        }
    }

    pub fn secret_type(
        secret_id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::SecretType {
            secret_id: secret_id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn backend_init(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendInit {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn rejected(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn conflict(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Code used when this error ends a run before any backend call
    pub fn setup_error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownAction { .. } => ErrorCode::UnknownAction,
            Self::SecretFetch { .. } | Self::SecretType { .. } => ErrorCode::LoginSecretUnavailable,
            Self::Configuration { .. } | Self::Validation { .. } => ErrorCode::InvalidParameters,
            _ => ErrorCode::BackendInitFailed,
        }
    }
}

impl From<config::ConfigError> for DomainError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::configuration(err.to_string())
    }
}
