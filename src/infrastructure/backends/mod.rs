//! Credential backends, one per provider job

pub mod certificate;
pub mod iam_api_key;
pub mod jfrog_token;
pub mod postgres;
pub mod slack_token;

use std::fmt;
use std::sync::Arc;

use crate::config::{HttpConfig, ParameterSource};
use crate::domain::BackendConnector;

pub use certificate::CertificateConnector;
pub use iam_api_key::IamApiKeyConnector;
pub use jfrog_token::JfrogTokenConnector;
pub use postgres::PostgresRoleConnector;
pub use slack_token::SlackTokenConnector;

/// Provider a job run acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    IamApiKey,
    JfrogToken,
    SlackToken,
    PostgresRole,
    Certificate,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IamApiKey => "iam-api-key",
            Self::JfrogToken => "jfrog-token",
            Self::SlackToken => "slack-token",
            Self::PostgresRole => "postgres-role",
            Self::Certificate => "certificate",
        }
    }

    /// Builds the connector that resolves this provider's backend at run time
    pub fn connector(
        &self,
        parameters: ParameterSource,
        http: HttpConfig,
    ) -> Arc<dyn BackendConnector> {
        match self {
            Self::IamApiKey => Arc::new(IamApiKeyConnector::new(parameters, http)),
            Self::JfrogToken => Arc::new(JfrogTokenConnector::new(parameters, http)),
            Self::SlackToken => Arc::new(SlackTokenConnector::new(parameters, http)),
            Self::PostgresRole => Arc::new(PostgresRoleConnector::new(parameters, http)),
            Self::Certificate => Arc::new(CertificateConnector::new(parameters)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_matches_provider() {
        let cases = [
            (Provider::IamApiKey, "iam"),
            (Provider::JfrogToken, "jfrog"),
            (Provider::SlackToken, "slack"),
            (Provider::PostgresRole, "postgres"),
            (Provider::Certificate, "certificate"),
        ];

        for (provider, backend) in cases {
            let connector = provider.connector(ParameterSource::default(), HttpConfig::default());
            assert_eq!(connector.backend_name(), backend);
        }
    }

    #[test]
    fn test_names_match_subcommands() {
        use crate::cli::Cli;
        use clap::Parser;

        let providers = [
            Provider::IamApiKey,
            Provider::JfrogToken,
            Provider::SlackToken,
            Provider::PostgresRole,
            Provider::Certificate,
        ];

        for provider in providers {
            let cli = Cli::try_parse_from(["sm-credentials-provider", provider.as_str()]).unwrap();
            assert_eq!(cli.command.provider(), provider);
        }
    }
}
