//! Transactional access to the role catalog

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::domain::DomainError;

use super::BACKEND;

/// Database able to run role DDL inside a transaction
#[async_trait]
pub trait RoleDatabase: Send + Sync + std::fmt::Debug {
    async fn begin(&self) -> Result<Box<dyn RoleTransaction>, DomainError>;
}

/// Open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait RoleTransaction: Send {
    async fn execute(&mut self, sql: &str) -> Result<(), DomainError>;

    async fn role_oid(&mut self, role_name: &str) -> Result<u32, DomainError>;

    async fn role_name(&mut self, oid: u32) -> Result<Option<String>, DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}

fn sql_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::rejected(BACKEND, format!("{}: {}", context, err))
}

/// sqlx pool against a real PostgreSQL server
#[derive(Debug, Clone)]
pub struct PgRoleDatabase {
    pool: PgPool,
}

impl PgRoleDatabase {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with the composed URL, trusting `ca_certificate_pem` for TLS
    pub async fn connect(
        composed: &str,
        ca_certificate_pem: &[u8],
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let options = PgConnectOptions::from_str(composed)
            .map_err(|e| {
                DomainError::backend_init(
                    BACKEND,
                    format!("failed to parse connection string: {}", e),
                )
            })?
            .ssl_root_cert_from_pem(ca_certificate_pem.to_vec());

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                DomainError::backend_init(BACKEND, format!("cannot connect to postgres: {}", e))
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RoleDatabase for PgRoleDatabase {
    async fn begin(&self) -> Result<Box<dyn RoleTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| sql_error("cannot begin transaction", e))?;

        Ok(Box::new(PgRoleTransaction { tx }))
    }
}

struct PgRoleTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RoleTransaction for PgRoleTransaction {
    async fn execute(&mut self, sql: &str) -> Result<(), DomainError> {
        sqlx::Executor::execute(&mut *self.tx, sqlx::raw_sql(sql))
            .await
            .map(|_| ())
            .map_err(|e| sql_error("statement failed", e))
    }

    async fn role_oid(&mut self, role_name: &str) -> Result<u32, DomainError> {
        let oid: Oid = sqlx::query_scalar("SELECT oid FROM pg_roles WHERE rolname = $1")
            .bind(role_name)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| sql_error("cannot retrieve role oid", e))?;

        Ok(oid.0)
    }

    async fn role_name(&mut self, oid: u32) -> Result<Option<String>, DomainError> {
        sqlx::query_scalar("SELECT rolname FROM pg_roles WHERE oid = $1")
            .bind(Oid(oid))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| sql_error(&format!("error checking role with oid '{}' existence", oid), e))
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| sql_error("cannot commit transaction", e))
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory role catalog with all-or-nothing transactions

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct Catalog {
        roles: BTreeMap<u32, String>,
        next_oid: u32,
        statements: Vec<String>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct InMemoryRoleDatabase {
        catalog: Arc<Mutex<Catalog>>,
        fail_on: Option<String>,
    }

    impl InMemoryRoleDatabase {
        pub fn new() -> Self {
            Self {
                catalog: Arc::new(Mutex::new(Catalog {
                    next_oid: 16384,
                    ..Default::default()
                })),
                fail_on: None,
            }
        }

        /// Makes every statement starting with `prefix` fail
        pub fn failing_on(mut self, prefix: impl Into<String>) -> Self {
            self.fail_on = Some(prefix.into());
            self
        }

        pub fn with_role(self, oid: u32, name: impl Into<String>) -> Self {
            self.catalog.lock().unwrap().roles.insert(oid, name.into());
            self
        }

        pub fn roles(&self) -> Vec<String> {
            self.catalog.lock().unwrap().roles.values().cloned().collect()
        }

        /// Statements of committed transactions, in order
        pub fn committed_statements(&self) -> Vec<String> {
            self.catalog.lock().unwrap().statements.clone()
        }
    }

    #[async_trait]
    impl RoleDatabase for InMemoryRoleDatabase {
        async fn begin(&self) -> Result<Box<dyn RoleTransaction>, DomainError> {
            let snapshot = self.catalog.lock().unwrap().clone();
            Ok(Box::new(InMemoryTransaction {
                target: Arc::clone(&self.catalog),
                working: snapshot,
                fail_on: self.fail_on.clone(),
            }))
        }
    }

    struct InMemoryTransaction {
        target: Arc<Mutex<Catalog>>,
        working: Catalog,
        fail_on: Option<String>,
    }

    fn first_identifier(sql: &str) -> Option<String> {
        let start = sql.find('"')? + 1;
        let end = start + sql[start..].find('"')?;
        Some(sql[start..end].to_string())
    }

    fn last_identifier(sql: &str) -> Option<String> {
        let end = sql.rfind('"')?;
        let start = sql[..end].rfind('"')? + 1;
        Some(sql[start..end].to_string())
    }

    #[async_trait]
    impl RoleTransaction for InMemoryTransaction {
        async fn execute(&mut self, sql: &str) -> Result<(), DomainError> {
            if let Some(prefix) = &self.fail_on {
                if sql.starts_with(prefix.as_str()) {
                    let message = format!("statement failed: {}", sql);
                    return Err(DomainError::rejected(BACKEND, message));
                }
            }

            if sql.starts_with("CREATE ROLE") {
                let name = first_identifier(sql).unwrap_or_default();
                let oid = self.working.next_oid;
                self.working.next_oid += 1;
                self.working.roles.insert(oid, name);
            } else if sql.starts_with("DROP ROLE IF EXISTS") {
                let name = last_identifier(sql).unwrap_or_default();
                self.working.roles.retain(|_, role| *role != name);
            }

            self.working.statements.push(sql.to_string());
            Ok(())
        }

        async fn role_oid(&mut self, role_name: &str) -> Result<u32, DomainError> {
            self.working
                .roles
                .iter()
                .find(|(_, name)| name.as_str() == role_name)
                .map(|(oid, _)| *oid)
                .ok_or_else(|| DomainError::rejected(BACKEND, "cannot retrieve role oid: no rows"))
        }

        async fn role_name(&mut self, oid: u32) -> Result<Option<String>, DomainError> {
            Ok(self.working.roles.get(&oid).cloned())
        }

        async fn commit(self: Box<Self>) -> Result<(), DomainError> {
            *self.target.lock().unwrap() = self.working;
            Ok(())
        }
    }
}
