//! Configuration - job settings and task parameters

mod app_config;
mod parameters;

pub use app_config::{AppConfig, HttpConfig, LogFormat, LoggingConfig, OrchestratorConfig};
pub use parameters::{ParameterSource, TaskParameters};

#[cfg(test)]
pub(crate) use parameters::test_support;
