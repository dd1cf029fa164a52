use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dialect::{ForeignKey, Ident, SqlDialect, TableColumn};
use crate::error::VersioningError;
use crate::models::{
    DatasetRow, DatasetVersionRow, NewColumnDefinition, NewDataset, NewDatasetVersion,
};
use crate::schema::{column_definitions, dataset_versions, datasets};

/// Relations the catalog itself owns; dataset names must not shadow them.
const METADATA_TABLES: [&str; 3] = ["datasets", "dataset_versions", "column_definitions"];

/// Longest accepted dataset name. Leaves room for the `_connection` and
/// staging suffixes within the identifier length limit.
const MAX_DATASET_NAME_LEN: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version_id: i32,
    pub version_number: i32,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub column_count: i64,
}

/// Validates a dataset name as a safe identifier that cannot collide with
/// catalog relations or generated table names.
pub fn validate_dataset_name(name: &str) -> Result<Ident, VersioningError> {
    let ident = Ident::new(name)?;
    let lowered = name.to_ascii_lowercase();
    if name.len() > MAX_DATASET_NAME_LEN
        || METADATA_TABLES.contains(&lowered.as_str())
        || lowered.ends_with("_connection")
        || lowered.contains("_staging_")
    {
        return Err(VersioningError::SchemaFailure {
            message: format!("'{}' is not usable as a dataset name", name),
        });
    }
    Ok(ident)
}

/// Column names the engine reserves for its own surrogate keys.
pub fn is_reserved_column(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    lowered == "row_id" || lowered == "version_id"
}

/// Owns the three metadata relations and the per-dataset canonical/junction
/// table pair.
#[derive(Debug, Clone, Copy)]
pub struct SchemaCatalog {
    dialect: SqlDialect,
}

impl SchemaCatalog {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    fn col(name: &'static str, definition: &str) -> TableColumn {
        TableColumn {
            name: Ident::fixed(name),
            definition: definition.to_string(),
        }
    }

    /// Creates the metadata relations when missing. Runs once at startup.
    pub async fn ensure_metadata_tables(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<(), VersioningError> {
        let datasets_table = Ident::fixed("datasets");
        let versions_table = Ident::fixed("dataset_versions");
        let columns_table = Ident::fixed("column_definitions");

        let statements = [
            self.dialect.create_table_if_not_exists(
                &datasets_table,
                &[
                    Self::col("name", "text NOT NULL"),
                    Self::col("description", "text NOT NULL"),
                    Self::col("created_at", "timestamptz NOT NULL DEFAULT now()"),
                ],
                &[Ident::fixed("name")],
                &[],
            ),
            self.dialect.create_table_if_not_exists(
                &versions_table,
                &[
                    Self::col("id", "serial"),
                    Self::col("dataset_name", "text NOT NULL"),
                    Self::col("version_number", "integer NOT NULL"),
                    Self::col("created_at", "timestamptz NOT NULL DEFAULT now()"),
                    Self::col("description", "text NOT NULL"),
                ],
                &[Ident::fixed("id")],
                &[ForeignKey {
                    column: Ident::fixed("dataset_name"),
                    references_table: datasets_table.clone(),
                    references_column: Ident::fixed("name"),
                }],
            ),
            self.dialect.create_table_if_not_exists(
                &columns_table,
                &[
                    Self::col("id", "serial"),
                    Self::col("version_id", "integer NOT NULL"),
                    Self::col("column_name", "text NOT NULL"),
                ],
                &[Ident::fixed("id")],
                &[ForeignKey {
                    column: Ident::fixed("version_id"),
                    references_table: versions_table,
                    references_column: Ident::fixed("id"),
                }],
            ),
        ];

        for statement in statements {
            diesel::sql_query(statement).execute(conn).await?;
        }
        Ok(())
    }

    /// Creates the canonical table (surrogate key only; real columns arrive
    /// through schema evolution) and its junction table.
    pub async fn create_dataset_tables(
        &self,
        conn: &mut AsyncPgConnection,
        dataset: &Ident,
    ) -> Result<(), VersioningError> {
        let junction = dataset.with_suffix("_connection")?;
        let row_id = Ident::fixed("row_id");
        let version_id = Ident::fixed("version_id");

        let canonical_sql = self.dialect.create_table_if_not_exists(
            dataset,
            &[Self::col("row_id", "bigserial")],
            &[row_id.clone()],
            &[],
        );
        let junction_sql = self.dialect.create_table_if_not_exists(
            &junction,
            &[
                Self::col("row_id", "bigint NOT NULL"),
                Self::col("version_id", "integer NOT NULL"),
            ],
            &[row_id.clone(), version_id.clone()],
            &[
                ForeignKey {
                    column: row_id,
                    references_table: dataset.clone(),
                    references_column: Ident::fixed("row_id"),
                },
                ForeignKey {
                    column: version_id,
                    references_table: Ident::fixed("dataset_versions"),
                    references_column: Ident::fixed("id"),
                },
            ],
        );

        diesel::sql_query(canonical_sql).execute(conn).await?;
        diesel::sql_query(junction_sql).execute(conn).await?;
        info!("Created canonical and junction tables for {}", dataset);
        Ok(())
    }

    pub async fn insert_dataset(
        &self,
        conn: &mut AsyncPgConnection,
        name: &str,
        description: &str,
    ) -> Result<(), VersioningError> {
        let entry = NewDataset {
            name,
            description,
            created_at: Utc::now(),
        };
        diesel::insert_into(datasets::table)
            .values(&entry)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn dataset_exists(
        &self,
        conn: &mut AsyncPgConnection,
        name: &str,
    ) -> Result<bool, VersioningError> {
        let found: Option<DatasetRow> = datasets::table
            .find(name)
            .select(DatasetRow::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(found.is_some())
    }

    pub async fn list_datasets(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<Vec<DatasetEntry>, VersioningError> {
        let rows: Vec<DatasetRow> = datasets::table
            .order(datasets::created_at.asc())
            .select(DatasetRow::as_select())
            .load(conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Next version number for a dataset, computed from the current
    /// maximum inside the calling transaction.
    pub async fn next_version_number(
        &self,
        conn: &mut AsyncPgConnection,
        name: &str,
    ) -> Result<i32, VersioningError> {
        let current: Option<i32> = dataset_versions::table
            .filter(dataset_versions::dataset_name.eq(name))
            .select(max(dataset_versions::version_number))
            .get_result(conn)
            .await?;
        Ok(current.unwrap_or(0) + 1)
    }

    pub async fn insert_version(
        &self,
        conn: &mut AsyncPgConnection,
        name: &str,
        version_number: i32,
        description: &str,
    ) -> Result<i32, VersioningError> {
        let entry = NewDatasetVersion {
            dataset_name: name,
            version_number,
            created_at: Utc::now(),
            description,
        };
        let id = diesel::insert_into(dataset_versions::table)
            .values(&entry)
            .returning(dataset_versions::id)
            .get_result::<i32>(conn)
            .await?;
        Ok(id)
    }

    /// Records the exact column list of an upload for a version; insertion
    /// order defines display order.
    pub async fn record_columns(
        &self,
        conn: &mut AsyncPgConnection,
        version_id: i32,
        columns: &[String],
    ) -> Result<(), VersioningError> {
        let rows: Vec<NewColumnDefinition<'_>> = columns
            .iter()
            .map(|name| NewColumnDefinition {
                version_id,
                column_name: name,
            })
            .collect();
        diesel::insert_into(column_definitions::table)
            .values(&rows)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Union of every column name recorded across all versions of a
    /// dataset.
    pub async fn historical_columns(
        &self,
        conn: &mut AsyncPgConnection,
        name: &str,
    ) -> Result<Vec<String>, VersioningError> {
        let columns = column_definitions::table
            .inner_join(dataset_versions::table)
            .filter(dataset_versions::dataset_name.eq(name))
            .select(column_definitions::column_name)
            .distinct()
            .load::<String>(conn)
            .await?;
        Ok(columns)
    }

    pub async fn get_version(
        &self,
        conn: &mut AsyncPgConnection,
        version_id: i32,
    ) -> Result<Option<DatasetVersionRow>, VersioningError> {
        let row = dataset_versions::table
            .find(version_id)
            .select(DatasetVersionRow::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn version_columns(
        &self,
        conn: &mut AsyncPgConnection,
        version_id: i32,
    ) -> Result<Vec<String>, VersioningError> {
        let columns = column_definitions::table
            .filter(column_definitions::version_id.eq(version_id))
            .order(column_definitions::id.asc())
            .select(column_definitions::column_name)
            .load::<String>(conn)
            .await?;
        Ok(columns)
    }

    /// All versions of a dataset in creation order, each annotated with its
    /// column count.
    pub async fn list_versions(
        &self,
        conn: &mut AsyncPgConnection,
        name: &str,
    ) -> Result<Vec<VersionInfo>, VersioningError> {
        let rows: Vec<DatasetVersionRow> = dataset_versions::table
            .filter(dataset_versions::dataset_name.eq(name))
            .order((
                dataset_versions::created_at.asc(),
                dataset_versions::id.asc(),
            ))
            .select(DatasetVersionRow::as_select())
            .load(conn)
            .await?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            let count: i64 = column_definitions::table
                .filter(column_definitions::version_id.eq(row.id))
                .count()
                .get_result(conn)
                .await?;
            versions.push(row.into_info(count));
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_names_cannot_shadow_engine_tables() {
        assert!(validate_dataset_name("sales").is_ok());
        assert!(validate_dataset_name("datasets").is_err());
        assert!(validate_dataset_name("Dataset_Versions").is_err());
        assert!(validate_dataset_name("sales_connection").is_err());
        assert!(validate_dataset_name("sales_staging_ab12").is_err());
        assert!(validate_dataset_name(&"d".repeat(41)).is_err());
    }

    #[test]
    fn surrogate_key_columns_are_reserved() {
        assert!(is_reserved_column("row_id"));
        assert!(is_reserved_column("Version_Id"));
        assert!(!is_reserved_column("region"));
    }
}
