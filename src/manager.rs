use diesel_async::AsyncConnection;
use tracing::info;

use crate::catalog::{validate_dataset_name, DatasetEntry, SchemaCatalog, VersionInfo};
use crate::database::DatabaseManager;
use crate::dialect::{BackendKind, SqlDialect};
use crate::domain::Table;
use crate::error::VersioningError;
use crate::ingest::{self, IngestOutcome};
use crate::profiles::ConnectionProfile;
use crate::reader;

/// Engine facade: dataset creation, version ingestion, version reads, and
/// catalog browsing over one backend connection pool.
pub struct DatasetManager {
    database: DatabaseManager,
    catalog: SchemaCatalog,
    dialect: SqlDialect,
}

impl DatasetManager {
    pub async fn new(database_url: &str, backend: BackendKind) -> Result<Self, VersioningError> {
        let dialect = SqlDialect::new(backend);
        let catalog = SchemaCatalog::new(dialect);
        let database = DatabaseManager::new(database_url, &catalog).await?;
        info!("Dataset manager ready");
        Ok(Self {
            database,
            catalog,
            dialect,
        })
    }

    /// Connects through a stored profile, creating the target database
    /// first when the profile asks for it.
    pub async fn from_profile(profile: &ConnectionProfile) -> Result<Self, VersioningError> {
        if profile.create_database_if_missing {
            DatabaseManager::ensure_database(
                &profile.admin_url(),
                &profile.database,
                &SqlDialect::new(profile.backend),
            )
            .await?;
        }
        Self::new(&profile.database_url(), profile.backend).await
    }

    /// Registers a dataset and ingests its first version. The whole call is
    /// one transaction; on failure no dataset, tables, version, or rows
    /// remain.
    pub async fn create_dataset(
        &self,
        name: &str,
        table: &Table,
        description: &str,
    ) -> Result<IngestOutcome, VersioningError> {
        let dataset = validate_dataset_name(name)?;
        let catalog = self.catalog;
        let dialect = self.dialect;

        let mut conn = self.database.conn().await?;
        conn.transaction::<_, VersioningError, _>(|conn| {
            Box::pin(async move {
                if catalog.dataset_exists(conn, dataset.as_str()).await? {
                    return Err(VersioningError::IngestionFailure {
                        message: format!("dataset '{}' already exists", dataset),
                    });
                }
                catalog
                    .insert_dataset(conn, dataset.as_str(), description)
                    .await?;
                catalog.create_dataset_tables(conn, &dataset).await?;
                ingest::ingest_table(conn, &catalog, &dialect, &dataset, table, description).await
            })
        })
        .await
    }

    /// Ingests a new version of an existing dataset as one transaction.
    pub async fn ingest_version(
        &self,
        name: &str,
        table: &Table,
        description: &str,
    ) -> Result<IngestOutcome, VersioningError> {
        let dataset = validate_dataset_name(name)?;
        let catalog = self.catalog;
        let dialect = self.dialect;

        let mut conn = self.database.conn().await?;
        conn.transaction::<_, VersioningError, _>(|conn| {
            Box::pin(async move {
                if !catalog.dataset_exists(conn, dataset.as_str()).await? {
                    return Err(VersioningError::DatasetNotFound {
                        name: dataset.as_str().to_string(),
                    });
                }
                ingest::ingest_table(conn, &catalog, &dialect, &dataset, table, description).await
            })
        })
        .await
    }

    /// Reconstructs the table visible under one version of a dataset.
    pub async fn read_version(
        &self,
        name: &str,
        version_id: i32,
    ) -> Result<Table, VersioningError> {
        let dataset = validate_dataset_name(name)?;
        let mut conn = self.database.conn().await?;

        match self.catalog.get_version(&mut conn, version_id).await? {
            Some(version) if version.dataset_name == dataset.as_str() => {}
            _ => return Err(VersioningError::VersionNotFound { version_id }),
        }
        reader::read_version(&mut conn, &self.catalog, &self.dialect, &dataset, version_id).await
    }

    /// All versions of a dataset in creation order, with column counts.
    pub async fn list_versions(&self, name: &str) -> Result<Vec<VersionInfo>, VersioningError> {
        let dataset = validate_dataset_name(name)?;
        let mut conn = self.database.conn().await?;
        if !self.catalog.dataset_exists(&mut conn, dataset.as_str()).await? {
            return Err(VersioningError::DatasetNotFound {
                name: dataset.as_str().to_string(),
            });
        }
        self.catalog.list_versions(&mut conn, dataset.as_str()).await
    }

    /// Column names recorded for a version, in display order.
    pub async fn list_columns(&self, version_id: i32) -> Result<Vec<String>, VersioningError> {
        let mut conn = self.database.conn().await?;
        let columns = self.catalog.version_columns(&mut conn, version_id).await?;
        if columns.is_empty() {
            return Err(VersioningError::VersionNotFound { version_id });
        }
        Ok(columns)
    }

    pub async fn list_datasets(&self) -> Result<Vec<DatasetEntry>, VersioningError> {
        let mut conn = self.database.conn().await?;
        self.catalog.list_datasets(&mut conn).await
    }
}
