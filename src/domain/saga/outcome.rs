use std::fmt;

use crate::domain::credentials::CredentialId;
use crate::domain::error::ErrorCode;

/// Saga states, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Start,
    Created,
    CreateFailed,
    ReportFailed,
    Compensated,
    CompensationFailed,
    Revoked,
    ReportedOk,
    ReportedError,
    Fatal,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Created => "created",
            Self::CreateFailed => "create_failed",
            Self::ReportFailed => "report_failed",
            Self::Compensated => "compensated",
            Self::CompensationFailed => "compensation_failed",
            Self::Revoked => "revoked",
            Self::ReportedOk => "reported_ok",
            Self::ReportedError => "reported_error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded { credential_id: CredentialId },
    /// The failure was reported to the orchestrator
    Failed { code: ErrorCode, description: String },
    /// Nothing more could be reported; an operator has to look at it
    Fatal { description: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn terminal_state(&self) -> SagaState {
        match self {
            Self::Succeeded { .. } => SagaState::ReportedOk,
            Self::Failed { .. } => SagaState::ReportedError,
            Self::Fatal { .. } => SagaState::Fatal,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
