//! CLI module for the credentials provider jobs
//!
//! Each subcommand runs one provider job for the task described by the
//! `SM_` environment variables.

pub mod job;

use clap::{Parser, Subcommand};

use crate::infrastructure::backends::Provider;

/// Secrets Manager credentials provider jobs
#[derive(Parser)]
#[command(name = "sm-credentials-provider")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or delete IAM user API keys
    IamApiKey,

    /// Create or revoke JFrog access tokens
    JfrogToken,

    /// Rotate Slack access tokens through a refresh token exchange
    SlackToken,

    /// Create or drop PostgreSQL login roles
    PostgresRole,

    /// Generate self-signed certificates
    Certificate,
}

impl Command {
    pub fn provider(&self) -> Provider {
        match self {
            Self::IamApiKey => Provider::IamApiKey,
            Self::JfrogToken => Provider::JfrogToken,
            Self::SlackToken => Provider::SlackToken,
            Self::PostgresRole => Provider::PostgresRole,
            Self::Certificate => Provider::Certificate,
        }
    }
}
