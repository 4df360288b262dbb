//! Infrastructure layer - External service implementations

pub mod backends;
pub mod http_client;
pub mod iam_token;
pub mod logging;
pub mod orchestrator;
