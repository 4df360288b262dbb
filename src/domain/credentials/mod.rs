//! Credential domain - credentials, payloads and the backend capability

mod backend;
mod credential;
mod payload;

pub use backend::{BackendConnector, CredentialBackend};
pub use credential::{Credential, CredentialId};
pub use payload::{
    CredentialPayload, OutputParameter, PayloadSchema, PayloadValue, ValueKind,
    MAX_STRING_VALUE_LENGTH,
};

#[cfg(test)]
pub use backend::mock;
