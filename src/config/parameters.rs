//! Task and provider parameters supplied through `SM_` environment variables

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use validator::Validate;

use crate::domain::{CredentialId, DomainError, TaskAction, TaskContext};

const PARAMETER_PREFIX: &str = "SM";

/// Where `SM_` parameters are read from
#[derive(Debug, Clone, Default)]
pub struct ParameterSource {
    overrides: Option<HashMap<String, String>>,
}

impl ParameterSource {
    /// Reads the process environment
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Reads the given variables instead of the process environment
    pub fn from_map<K, V>(variables: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            overrides: Some(
                variables
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Deserializes and validates a parameter struct.
    ///
    /// `SM_SECRET_ID` lands in field `secret_id`, provider inputs such as
    /// `SM_SCOPE_VALUE` in `scope_value`.
    pub fn load<T>(&self) -> Result<T, DomainError>
    where
        T: DeserializeOwned + Validate,
    {
        let environment = config::Environment::with_prefix(PARAMETER_PREFIX)
            .ignore_empty(true)
            .source(self.overrides.clone());

        let parameters: T = config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        parameters.validate()?;
        Ok(parameters)
    }
}

/// Parameters every job receives from the orchestrator
#[derive(Clone, Deserialize, Validate)]
pub struct TaskParameters {
    #[validate(length(min = 1))]
    pub access_apikey: String,
    #[validate(url)]
    pub instance_url: String,
    #[validate(length(min = 1))]
    pub secret_group_id: String,
    #[validate(length(min = 1))]
    pub secret_name: String,
    #[validate(length(min = 1))]
    pub secret_task_id: String,
    #[validate(length(min = 1))]
    pub secret_id: String,
    #[validate(length(min = 1))]
    pub action: String,
    #[validate(length(min = 1))]
    pub trigger: String,
    #[serde(default)]
    pub credentials_id: Option<String>,
    #[serde(default)]
    pub secret_version_id: Option<String>,
}

impl fmt::Debug for TaskParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskParameters")
            .field("instance_url", &self.instance_url)
            .field("secret_id", &self.secret_id)
            .field("secret_task_id", &self.secret_task_id)
            .field("action", &self.action)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl TaskParameters {
    pub fn task_context(&self) -> TaskContext {
        let mut task = TaskContext::new(
            &self.secret_id,
            &self.secret_task_id,
            TaskAction::parse(&self.action),
        )
        .with_secret_group_id(&self.secret_group_id)
        .with_secret_name(&self.secret_name)
        .with_trigger(&self.trigger);

        if let Some(version) = &self.secret_version_id {
            task = task.with_secret_version_id(version);
        }
        if let Some(id) = &self.credentials_id {
            task = task.with_credentials_id(CredentialId::new(id));
        }
        task
    }
}
