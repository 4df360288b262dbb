//! PostgreSQL login roles with read access to one schema

mod database;

pub use database::{PgRoleDatabase, RoleDatabase, RoleTransaction};

#[cfg(test)]
pub use database::mock;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::config::{HttpConfig, ParameterSource};
use crate::domain::orchestrator::OrchestratorClient;
use crate::domain::{
    BackendConnector, Credential, CredentialBackend, CredentialId, CredentialPayload, DomainError,
    OutputParameter, PayloadSchema, TaskContext, ValueKind,
};

const BACKEND: &str = "postgres";
const ROLE_PREFIX: &str = "secrets_manager_";
const PASSWORD_LENGTH: usize = 64;
const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!$-_*";
const CERTIFICATE_POINTER: &str = "/connection/postgres/certificate/certificate_base64";
const COMPOSED_POINTER: &str = "/connection/postgres/composed/0";

fn default_schema() -> String {
    "public".to_string()
}

/// `SM_<NAME>_VALUE` inputs of the PostgreSQL role provider
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PostgresRoleParameters {
    #[serde(rename = "login_secret_id_value")]
    #[validate(length(min = 1))]
    pub login_secret_id: String,
    #[serde(rename = "schema_name_value", default = "default_schema")]
    #[validate(length(min = 1))]
    pub schema_name: String,
}

/// Quotes an SQL identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes an SQL string literal, doubling embedded quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LENGTH)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

fn generate_role_name() -> String {
    format!("{}{}", ROLE_PREFIX, Uuid::new_v4().to_string().replace('-', "_"))
}

/// Admin connection details read from the service-credentials secret
#[derive(Clone)]
pub struct ConnectionDetails {
    certificate_base64: String,
    composed: String,
}

impl ConnectionDetails {
    pub fn new(certificate_base64: impl Into<String>, composed: impl Into<String>) -> Self {
        Self {
            certificate_base64: certificate_base64.into(),
            composed: composed.into(),
        }
    }

    fn from_service_credentials(secret_id: &str, credentials: &Value) -> Result<Self, DomainError> {
        let field = |pointer: &str| {
            credentials
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    DomainError::secret_fetch(secret_id, format!("missing field '{}'", pointer))
                })
        };

        Ok(Self::new(field(CERTIFICATE_POINTER)?, field(COMPOSED_POINTER)?))
    }

    fn ca_certificate_pem(&self) -> Result<Vec<u8>, DomainError> {
        BASE64.decode(&self.certificate_base64).map_err(|e| {
            DomainError::backend_init(BACKEND, format!("cannot decode CA certificate: {}", e))
        })
    }

    /// Fails when the connection string cannot be rewritten for a new role
    fn ensure_rewritable(&self) -> Result<(), DomainError> {
        self.composed_for(ROLE_PREFIX, "")
            .map(|_| ())
            .map_err(|e| DomainError::backend_init(BACKEND, e.to_string()))
    }

    /// Admin connection string with the user and password replaced
    fn composed_for(&self, username: &str, password: &str) -> Result<String, DomainError> {
        let mut url = Url::parse(&self.composed)
            .map_err(|e| DomainError::internal(format!("cannot parse connection string: {}", e)))?;
        url.set_username(username)
            .and_then(|_| url.set_password(Some(password)))
            .map_err(|_| DomainError::internal("connection string cannot carry credentials"))?;

        Ok(url.to_string())
    }
}

impl std::fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDetails").finish_non_exhaustive()
    }
}

/// Creates and drops login roles, each change in a single transaction
#[derive(Debug)]
pub struct PostgresRoleBackend {
    database: Box<dyn RoleDatabase>,
    connection: ConnectionDetails,
    schema: String,
}

impl PostgresRoleBackend {
    pub fn new(
        database: Box<dyn RoleDatabase>,
        connection: ConnectionDetails,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            database,
            connection,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl CredentialBackend for PostgresRoleBackend {
    async fn create(&self, _task: &TaskContext) -> Result<Credential, DomainError> {
        let role_name = generate_role_name();
        let password = generate_password();
        let composed = self.connection.composed_for(&role_name, &password)?;
        let role = quote_identifier(&role_name);
        let schema = quote_identifier(&self.schema);

        let mut tx = self.database.begin().await?;
        tx.execute(&format!(
            "CREATE ROLE {} WITH LOGIN PASSWORD {};",
            role,
            quote_literal(&password)
        ))
        .await?;
        let oid = tx.role_oid(&role_name).await?;
        tx.execute(&format!("GRANT USAGE ON SCHEMA {} TO {};", schema, role))
            .await?;
        tx.execute(&format!(
            "GRANT SELECT ON ALL TABLES IN SCHEMA {} TO {};",
            schema, role
        ))
        .await?;
        tx.commit().await?;

        info!(credentials_id = oid, role = %role_name, "Role created");

        Ok(Credential::new(
            CredentialId::new(oid.to_string()),
            CredentialPayload::new()
                .with_string("certificate_base64", self.connection.certificate_base64.clone())
                .with_string("username", role_name)
                .with_string("password", password)
                .with_string("composed", composed),
        ))
    }

    async fn revoke(&self, credential_id: &CredentialId) -> Result<(), DomainError> {
        let oid: u32 = credential_id.as_str().parse().map_err(|_| {
            DomainError::rejected(BACKEND, format!("invalid role oid '{}'", credential_id))
        })?;

        let mut tx = self.database.begin().await?;
        let Some(role_name) = tx.role_name(oid).await? else {
            debug!(credentials_id = oid, "Role does not exist");
            return Ok(());
        };

        let role = quote_identifier(&role_name);
        let schema = quote_identifier(&self.schema);
        tx.execute(&format!(
            "REVOKE ALL PRIVILEGES ON SCHEMA {} FROM {};",
            schema, role
        ))
        .await?;
        tx.execute(&format!(
            "REVOKE ALL PRIVILEGES ON ALL TABLES IN SCHEMA {} FROM {};",
            schema, role
        ))
        .await?;
        tx.execute(&format!("DROP ROLE IF EXISTS {};", role)).await?;
        tx.commit().await?;

        info!(credentials_id = oid, role = %role_name, "Role dropped");
        Ok(())
    }

    fn output_schema(&self) -> PayloadSchema {
        PayloadSchema::new(vec![
            OutputParameter::required("certificate_base64", ValueKind::String),
            OutputParameter::required("username", ValueKind::String),
            OutputParameter::required("password", ValueKind::String),
            OutputParameter::required("composed", ValueKind::String),
        ])
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[derive(Debug)]
pub struct PostgresRoleConnector {
    parameters: ParameterSource,
    http: HttpConfig,
}

impl PostgresRoleConnector {
    pub fn new(parameters: ParameterSource, http: HttpConfig) -> Self {
        Self { parameters, http }
    }
}

#[async_trait]
impl BackendConnector for PostgresRoleConnector {
    async fn connect(
        &self,
        orchestrator: &dyn OrchestratorClient,
        _task: &TaskContext,
    ) -> Result<Box<dyn CredentialBackend>, DomainError> {
        let params: PostgresRoleParameters = self.parameters.load()?;

        info!(secret_id = %params.login_secret_id, "Obtaining PostgreSQL login secret");
        let secret = orchestrator.fetch_secret(&params.login_secret_id).await?;
        let connection = ConnectionDetails::from_service_credentials(
            secret.id(),
            secret.service_credentials()?,
        )?;
        connection.ensure_rewritable()?;

        let ca_certificate = connection.ca_certificate_pem()?;
        let database =
            PgRoleDatabase::connect(&connection.composed, &ca_certificate, self.http.timeout())
                .await?;

        Ok(Box::new(PostgresRoleBackend::new(
            Box::new(database),
            connection,
            params.schema_name,
        )))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
