use std::fmt;

use serde::{Deserialize, Serialize};

use super::CredentialPayload;

/// Identifier assigned by a backend to the credential it created
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential produced by a backend's create operation
#[derive(Debug, Clone)]
pub struct Credential {
    id: CredentialId,
    payload: CredentialPayload,
}

impl Credential {
    pub fn new(id: CredentialId, payload: CredentialPayload) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> &CredentialId {
        &self.id
    }

    pub fn payload(&self) -> &CredentialPayload {
        &self.payload
    }
}
