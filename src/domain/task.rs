//! Task context - the per-run input bundle handed over by the orchestrator

use std::fmt;

use super::credentials::CredentialId;

const CREATE_CREDENTIALS: &str = "create_credentials";
const DELETE_CREDENTIALS: &str = "delete_credentials";

/// Action requested by the orchestrator for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    Create,
    Delete,
    Unknown(String),
}

impl TaskAction {
    pub fn parse(value: &str) -> Self {
        match value {
            CREATE_CREDENTIALS => Self::Create,
            DELETE_CREDENTIALS => Self::Delete,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => CREATE_CREDENTIALS,
            Self::Delete => DELETE_CREDENTIALS,
            Self::Unknown(value) => value,
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers of the secret task this run works on
#[derive(Debug, Clone)]
pub struct TaskContext {
    secret_id: String,
    secret_task_id: String,
    secret_group_id: String,
    secret_name: String,
    secret_version_id: Option<String>,
    trigger: String,
    action: TaskAction,
    credentials_id: Option<CredentialId>,
}

impl TaskContext {
    pub fn new(
        secret_id: impl Into<String>,
        secret_task_id: impl Into<String>,
        action: TaskAction,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_task_id: secret_task_id.into(),
            secret_group_id: String::new(),
            secret_name: String::new(),
            secret_version_id: None,
            trigger: String::new(),
            action,
            credentials_id: None,
        }
    }

    pub fn with_secret_group_id(mut self, secret_group_id: impl Into<String>) -> Self {
        self.secret_group_id = secret_group_id.into();
        self
    }

    pub fn with_secret_name(mut self, secret_name: impl Into<String>) -> Self {
        self.secret_name = secret_name.into();
        self
    }

    pub fn with_secret_version_id(mut self, secret_version_id: impl Into<String>) -> Self {
        self.secret_version_id = Some(secret_version_id.into());
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = trigger.into();
        self
    }

    pub fn with_credentials_id(mut self, credentials_id: CredentialId) -> Self {
        self.credentials_id = Some(credentials_id);
        self
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    pub fn secret_task_id(&self) -> &str {
        &self.secret_task_id
    }

    pub fn secret_group_id(&self) -> &str {
        &self.secret_group_id
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    pub fn secret_version_id(&self) -> Option<&str> {
        self.secret_version_id.as_deref()
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn action(&self) -> &TaskAction {
        &self.action
    }

    pub fn credentials_id(&self) -> Option<&CredentialId> {
        self.credentials_id.as_ref()
    }

    /// Records the identifier assigned by a successful create
    pub fn record_credentials_id(&mut self, credentials_id: CredentialId) {
        self.credentials_id = Some(credentials_id);
    }

    /// Last `n` characters of the task id, used to keep generated names unique
    pub fn task_id_suffix(&self, n: usize) -> &str {
        let len = self.secret_task_id.len();
        if len <= n {
            return &self.secret_task_id;
        }

        let mut start = len - n;
        while !self.secret_task_id.is_char_boundary(start) {
            start += 1;
        }
        &self.secret_task_id[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!(TaskAction::parse("create_credentials"), TaskAction::Create);
        assert_eq!(TaskAction::parse("delete_credentials"), TaskAction::Delete);
        assert_eq!(
            TaskAction::parse("rotate"),
            TaskAction::Unknown("rotate".to_string())
        );
        assert_eq!(TaskAction::parse("rotate").as_str(), "rotate");
    }

    #[test]
    fn test_task_id_suffix() {
        let task =
            TaskContext::new("secret", "0b5571f7-21e6-42b7-91c5-3f5ac9793a46", TaskAction::Create);
        assert_eq!(task.task_id_suffix(6), "793a46");

        let short = TaskContext::new("secret", "abc", TaskAction::Create);
        assert_eq!(short.task_id_suffix(6), "abc");
    }

    #[test]
    fn test_record_credentials_id() {
        let mut task = TaskContext::new("secret", "task", TaskAction::Create);
        assert!(task.credentials_id().is_none());

        task.record_credentials_id(CredentialId::new("ApiKey-123"));
        assert_eq!(task.credentials_id().map(|id| id.as_str()), Some("ApiKey-123"));
    }
}
