//! Job command - runs one provider for one task

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{AppConfig, ParameterSource, TaskParameters};
use crate::domain::{Dispatcher, OrchestratorClient, Outcome, ProvisioningSaga};
use crate::infrastructure::backends::Provider;
use crate::infrastructure::iam_token::{iam_url_for, IamTokenSource};
use crate::infrastructure::logging;
use crate::infrastructure::orchestrator::SecretsManagerClient;

/// Run a provider job against the process environment
pub async fn run(provider: Provider) -> anyhow::Result<Outcome> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging)?;

    Ok(execute(provider, &config, ParameterSource::from_env()).await)
}

/// Runs the job with explicit settings and parameter source
pub async fn execute(
    provider: Provider,
    config: &AppConfig,
    parameters: ParameterSource,
) -> Outcome {
    let task_parameters: TaskParameters = match parameters.load() {
        Ok(params) => params,
        Err(e) => {
            error!(provider = %provider, error = %e, "Invalid task parameters");
            return Outcome::Fatal {
                description: e.to_string(),
            };
        }
    };

    let orchestrator = match orchestrator_client(config, &task_parameters) {
        Ok(client) => client,
        Err(e) => {
            error!(provider = %provider, error = %e, "Cannot create orchestrator client");
            return Outcome::Fatal {
                description: e.to_string(),
            };
        }
    };

    let task = task_parameters.task_context();
    let span = logging::task_span(provider.as_str(), &task);
    let connector = provider.connector(parameters, config.http.clone());
    let dispatcher = Dispatcher::new(ProvisioningSaga::new(orchestrator, connector), span);

    let outcome = dispatcher.dispatch(task).await;
    match &outcome {
        Outcome::Succeeded { credential_id } => {
            info!(provider = %provider, credentials_id = %credential_id, "Job finished");
        }
        Outcome::Failed { code, description } => {
            error!(provider = %provider, code = %code, description = %description, "Job failed");
        }
        Outcome::Fatal { description } => {
            error!(
                provider = %provider,
                description = %description,
                "Job failed without reporting"
            );
        }
    }
    outcome
}

fn orchestrator_client(
    config: &AppConfig,
    params: &TaskParameters,
) -> Result<Arc<dyn OrchestratorClient>, crate::domain::DomainError> {
    let iam_url = config
        .orchestrator
        .iam_url
        .clone()
        .unwrap_or_else(|| iam_url_for(&params.instance_url).to_string());
    let token = IamTokenSource::new(iam_url, &params.access_apikey, config.http.timeout())?;

    Ok(Arc::new(SecretsManagerClient::new(
        &params.instance_url,
        token,
        config.http.timeout(),
    )?))
}
