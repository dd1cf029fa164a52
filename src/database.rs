use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::catalog::SchemaCatalog;
use crate::dialect::{Ident, SqlDialect};
use crate::error::VersioningError;

/// Pooled Postgres access. Connections are scoped leases returned to the
/// pool on drop.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<AsyncPgConnection>,
}

impl DatabaseManager {
    /// Builds the pool and bootstraps the metadata relations.
    pub async fn new(
        database_url: &str,
        catalog: &SchemaCatalog,
    ) -> Result<Self, VersioningError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool =
            Pool::builder(config)
                .build()
                .map_err(|e| VersioningError::ConnectionFailure {
                    message: format!("Failed to create database pool: {}", e),
                })?;

        let manager = Self { pool };
        let mut conn = manager.conn().await?;
        catalog.ensure_metadata_tables(&mut conn).await?;
        info!("Metadata relations ready");
        Ok(manager)
    }

    pub async fn conn(&self) -> Result<Object<AsyncPgConnection>, VersioningError> {
        self.pool
            .get()
            .await
            .map_err(|e| VersioningError::ConnectionFailure {
                message: format!("Failed to get database connection: {}", e),
            })
    }

    /// Creates the target database through a maintenance connection.
    /// `CREATE DATABASE` cannot run inside a transaction, so this is a
    /// separate idempotent bootstrap step; an existing database counts as
    /// success.
    pub async fn ensure_database(
        admin_url: &str,
        database: &str,
        dialect: &SqlDialect,
    ) -> Result<(), VersioningError> {
        let name = Ident::new(database)?;
        let mut conn = AsyncPgConnection::establish(admin_url).await.map_err(|e| {
            VersioningError::ConnectionFailure {
                message: format!("Failed to reach maintenance database: {}", e),
            }
        })?;

        let result = diesel::sql_query(dialect.create_database_if_not_exists(&name))
            .execute(&mut conn)
            .await;
        match result {
            Ok(_) => {
                info!("Created database {}", database);
                Ok(())
            }
            Err(err) => {
                let mapped = VersioningError::from(err);
                if let VersioningError::SchemaFailure { ref message } = mapped {
                    if message.contains("already exists") {
                        return Ok(());
                    }
                }
                Err(mapped)
            }
        }
    }
}
