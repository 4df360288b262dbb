//! Credential payload and its declared output parameters

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domain::DomainError;

/// Maximum length of a string value in a payload
pub const MAX_STRING_VALUE_LENGTH: usize = 100_000;

static OUTPUT_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// Single value of a credential payload
#[derive(Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PayloadValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl PayloadValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Integer(_) => ValueKind::Integer,
            Self::Boolean(_) => ValueKind::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} redacted>", self.kind())
    }
}

/// Declared type of an output parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

/// Flat mapping from output parameter name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CredentialPayload(BTreeMap<String, PayloadValue>);

impl CredentialPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), PayloadValue::String(value.into()));
        self
    }

    pub fn with_integer(mut self, name: impl Into<String>, value: i64) -> Self {
        self.0.insert(name.into(), PayloadValue::Integer(value));
        self
    }

    pub fn with_boolean(mut self, name: impl Into<String>, value: bool) -> Self {
        self.0.insert(name.into(), PayloadValue::Boolean(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PayloadValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PayloadValue)> {
        self.0.iter()
    }
}

/// Output parameter a backend declares for its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParameter {
    name: &'static str,
    kind: ValueKind,
    required: bool,
}

impl OutputParameter {
    pub const fn required(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Declared output parameters of a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSchema {
    parameters: Vec<OutputParameter>,
}

impl PayloadSchema {
    pub fn new(parameters: Vec<OutputParameter>) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &[OutputParameter] {
        &self.parameters
    }

    /// Checks the declaration itself and then the payload against it
    pub fn validate(&self, payload: &CredentialPayload) -> Result<(), DomainError> {
        self.validate_declaration()?;

        let mut problems = Vec::new();

        for parameter in &self.parameters {
            match payload.get(parameter.name) {
                None if parameter.required => {
                    problems.push(format!("required output '{}' is missing", parameter.name));
                }
                None => {}
                Some(value) if value.kind() != parameter.kind => {
                    problems.push(format!(
                        "output '{}' must be {}, got {}",
                        parameter.name,
                        parameter.kind,
                        value.kind()
                    ));
                }
                Some(PayloadValue::String(value)) => {
                    if parameter.required && value.is_empty() {
                        problems.push(format!("required output '{}' is empty", parameter.name));
                    }
                    if value.chars().count() > MAX_STRING_VALUE_LENGTH {
                        problems.push(format!(
                            "output '{}' exceeds {} characters",
                            parameter.name, MAX_STRING_VALUE_LENGTH
                        ));
                    }
                }
                Some(_) => {}
            }
        }

        for (name, _) in payload.iter() {
            if !self.parameters.iter().any(|p| p.name == name) {
                problems.push(format!("output '{}' is not declared", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "credentials payload is invalid: {}",
                problems.join("; ")
            )))
        }
    }

    fn validate_declaration(&self) -> Result<(), DomainError> {
        if !self.parameters.iter().any(|p| p.required) {
            return Err(DomainError::validation(
                "at least one output parameter must be declared required",
            ));
        }

        if let Some(bad) = self
            .parameters
            .iter()
            .find(|p| !OUTPUT_NAME_PATTERN.is_match(p.name))
        {
            return Err(DomainError::validation(format!(
                "output parameter name '{}' must be lowercase letters, digits and underscores",
                bad.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> PayloadSchema {
        PayloadSchema::new(vec![
            OutputParameter::required("username", ValueKind::String),
            OutputParameter::required("password", ValueKind::String),
            OutputParameter::optional("ttl", ValueKind::Integer),
        ])
    }

    #[test]
    fn test_valid_payload() {
        let payload = CredentialPayload::new()
            .with_string("username", "role")
            .with_string("password", "secret")
            .with_integer("ttl", 60);

        assert!(schema().validate(&payload).is_ok());
    }

    #[test]
    fn test_missing_required_output() {
        let payload = CredentialPayload::new().with_string("username", "role");

        let err = schema().validate(&payload).unwrap_err();
        assert!(err.to_string().contains("'password' is missing"));
    }

    #[test]
    fn test_wrong_kind() {
        let payload = CredentialPayload::new()
            .with_string("username", "role")
            .with_string("password", "secret")
            .with_boolean("ttl", true);

        let err = schema().validate(&payload).unwrap_err();
        assert!(err.to_string().contains("'ttl' must be integer, got boolean"));
    }

    #[test]
    fn test_string_size_limit() {
        let payload = CredentialPayload::new()
            .with_string("username", "role")
            .with_string("password", "x".repeat(MAX_STRING_VALUE_LENGTH + 1));

        let err = schema().validate(&payload).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_undeclared_output() {
        let payload = CredentialPayload::new()
            .with_string("username", "role")
            .with_string("password", "secret")
            .with_string("extra", "value");

        let err = schema().validate(&payload).unwrap_err();
        assert!(err.to_string().contains("'extra' is not declared"));
    }

    #[test]
    fn test_schema_requires_one_required_output() {
        let schema =
            PayloadSchema::new(vec![OutputParameter::optional("token", ValueKind::String)]);
        let payload = CredentialPayload::new().with_string("token", "abc");

        let err = schema.validate(&payload).unwrap_err();
        assert!(err.to_string().contains("at least one output parameter"));
    }

    #[test]
    fn test_payload_serializes_flat() {
        let payload = CredentialPayload::new()
            .with_string("apikey", "key")
            .with_boolean("locked", true)
            .with_integer("expires_in", 90);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"apikey": "key", "locked": true, "expires_in": 90})
        );
    }
}
