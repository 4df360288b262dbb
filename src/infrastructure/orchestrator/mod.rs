//! Orchestrator client implementations

mod secrets_manager;

pub use secrets_manager::SecretsManagerClient;
