//! Secrets Manager credentials provider jobs
//!
//! Short-lived jobs that create or revoke a credential in an external
//! system on behalf of a Secrets Manager secret task:
//! - IAM user API keys
//! - JFrog access tokens
//! - Slack tokens rotated through a refresh token exchange
//! - PostgreSQL login roles
//! - Self-signed certificates

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
