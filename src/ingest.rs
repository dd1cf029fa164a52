use diesel::sql_types::{Integer, Jsonb, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{is_reserved_column, SchemaCatalog};
use crate::dialect::{ColumnDef, Ident, LinkColumn, SqlDialect};
use crate::domain::Table;
use crate::error::VersioningError;
use crate::inference;

/// What one ingestion call did, for logging and test assertions.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub version_id: i32,
    pub version_number: i32,
    pub staged_rows: usize,
    pub inserted_rows: usize,
    pub linked_rows: usize,
    pub added_columns: Vec<String>,
}

/// Splits the upload's columns against the historical union: columns never
/// seen before, and the comparison-eligible intersection. Upload order is
/// preserved.
fn partition_columns(current: &[String], historical: &[String]) -> (Vec<String>, Vec<String>) {
    let new: Vec<String> = current
        .iter()
        .filter(|c| !historical.contains(c))
        .cloned()
        .collect();
    let comparison: Vec<String> = current
        .iter()
        .filter(|c| historical.contains(c))
        .cloned()
        .collect();
    (new, comparison)
}

fn staging_ident(dataset: &Ident) -> Result<Ident, VersioningError> {
    let suffix = Uuid::new_v4().simple().to_string();
    dataset.with_suffix(&format!("_staging_{}", &suffix[..8]))
}

/// One ingestion: stage, evolve the schema, deduplicate, create the
/// version, link rows, record columns. Must run inside a transaction; the
/// first statement takes the per-dataset advisory lock so concurrent
/// ingestions of the same dataset serialize.
pub async fn ingest_table(
    conn: &mut AsyncPgConnection,
    catalog: &SchemaCatalog,
    dialect: &SqlDialect,
    dataset: &Ident,
    table: &Table,
    description: &str,
) -> Result<IngestOutcome, VersioningError> {
    for column in table.columns() {
        if is_reserved_column(&column.name) {
            return Err(VersioningError::SchemaFailure {
                message: format!("column name '{}' is reserved", column.name),
            });
        }
    }

    diesel::sql_query(dialect.acquire_dataset_lock())
        .bind::<Text, _>(dataset.as_str())
        .execute(conn)
        .await?;

    let historical = catalog.historical_columns(conn, dataset.as_str()).await?;
    let current = table.column_names();
    let column_defs = inference::infer_table(table)?;

    // Stage the upload.
    let staging = staging_ident(dataset)?;
    diesel::sql_query(dialect.create_staging_table(&staging, &column_defs))
        .execute(conn)
        .await?;
    let staged_rows = diesel::sql_query(dialect.stage_rows(&staging, &column_defs))
        .bind::<Jsonb, _>(table.rows_as_json())
        .execute(conn)
        .await?;
    debug!("Staged {} rows into {}", staged_rows, staging);

    // Schema evolution: genuinely new columns are added to the canonical
    // table as nullable, typed per column.
    let (new_columns, comparison) = partition_columns(&current, &historical);
    if !new_columns.is_empty() {
        let additions: Vec<ColumnDef> = column_defs
            .iter()
            .filter(|def| new_columns.iter().any(|n| n == def.name.as_str()))
            .cloned()
            .collect();
        diesel::sql_query(dialect.alter_table_add_columns(dataset, &additions))
            .execute(conn)
            .await?;
        info!(
            "Added {} column(s) to {}: {}",
            additions.len(),
            dataset,
            new_columns.join(", ")
        );
    }

    // Deduplication is disabled for the whole call when the upload
    // introduced any new column; every staged row is then inserted.
    let comparison_for_insert: Vec<Ident> = if new_columns.is_empty() {
        comparison
            .iter()
            .map(|c| Ident::new(c))
            .collect::<Result<_, _>>()?
    } else {
        Vec::new()
    };
    let current_idents: Vec<Ident> = column_defs.iter().map(|d| d.name.clone()).collect();
    let inserted_rows = diesel::sql_query(dialect.insert_novel_rows(
        dataset,
        &staging,
        &current_idents,
        &comparison_for_insert,
    ))
    .execute(conn)
    .await?;

    // New version row: number derives from the per-dataset maximum within
    // this same transaction.
    let version_number = catalog.next_version_number(conn, dataset.as_str()).await?;
    let version_id = catalog
        .insert_version(conn, dataset.as_str(), version_number, description)
        .await?;

    // Link every canonical row matching the upload across the union of
    // historical and current columns; historical-only columns must be NULL
    // on the canonical side.
    let mut link_columns: Vec<LinkColumn> = current_idents
        .iter()
        .map(|name| LinkColumn {
            name: name.clone(),
            in_current: true,
        })
        .collect();
    for name in &historical {
        if !current.contains(name) {
            link_columns.push(LinkColumn {
                name: Ident::new(name)?,
                in_current: false,
            });
        }
    }
    let junction = dataset.with_suffix("_connection")?;
    let linked_rows =
        diesel::sql_query(dialect.link_version_rows(dataset, &junction, &staging, &link_columns))
            .bind::<Integer, _>(version_id)
            .execute(conn)
            .await?;

    catalog.record_columns(conn, version_id, &current).await?;

    info!(
        "Ingested version {} (number {}) of {}: {} staged, {} inserted, {} linked",
        version_id, version_number, dataset, staged_rows, inserted_rows, linked_rows
    );

    Ok(IngestOutcome {
        version_id,
        version_number,
        staged_rows,
        inserted_rows,
        linked_rows,
        added_columns: new_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_ingestion_flags_every_column_as_new() {
        let (new, comparison) = partition_columns(&names(&["id", "amount"]), &[]);
        assert_eq!(new, names(&["id", "amount"]));
        assert!(comparison.is_empty());
    }

    #[test]
    fn repeat_ingestion_compares_on_the_intersection() {
        let historical = names(&["id", "amount", "region"]);
        let (new, comparison) = partition_columns(&names(&["id", "amount"]), &historical);
        assert!(new.is_empty());
        assert_eq!(comparison, names(&["id", "amount"]));
    }

    #[test]
    fn schema_growth_splits_new_from_comparable() {
        let historical = names(&["id", "amount"]);
        let (new, comparison) =
            partition_columns(&names(&["id", "amount", "region"]), &historical);
        assert_eq!(new, names(&["region"]));
        assert_eq!(comparison, names(&["id", "amount"]));
    }

    #[test]
    fn staging_names_stay_within_identifier_limits() {
        let dataset = Ident::new(&"d".repeat(40)).unwrap();
        let staging = staging_ident(&dataset).unwrap();
        assert!(staging.as_str().len() <= 63);
        assert!(staging.as_str().contains("_staging_"));
    }
}
