use std::collections::HashMap;

use diesel::prelude::QueryableByName;
use diesel::sql_types::{BigInt, Integer, Jsonb, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::debug;

use crate::catalog::SchemaCatalog;
use crate::dialect::{Ident, SqlDialect};
use crate::domain::{Column, ColumnType, Table, Value};
use crate::error::VersioningError;
use crate::inference;

#[derive(QueryableByName)]
struct VersionDataRow {
    #[diesel(sql_type = BigInt)]
    row_id: i64,
    #[diesel(sql_type = Jsonb)]
    row_data: serde_json::Value,
}

#[derive(QueryableByName)]
struct PhysicalColumn {
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
}

/// Reconstructs a version's visible table: exactly the columns recorded for
/// the version plus the row id, rows in row-id order. A version with no
/// recorded columns is reported as not found, never as an empty table.
pub async fn read_version(
    conn: &mut AsyncPgConnection,
    catalog: &SchemaCatalog,
    dialect: &SqlDialect,
    dataset: &Ident,
    version_id: i32,
) -> Result<Table, VersioningError> {
    let column_names = catalog.version_columns(conn, version_id).await?;
    if column_names.is_empty() {
        return Err(VersioningError::VersionNotFound { version_id });
    }

    // Physical types drive how JSONB cells are re-typed. A categorical
    // upload column reads back as plain text; both are stored as varchar.
    let physical: Vec<PhysicalColumn> = diesel::sql_query(dialect.select_physical_columns())
        .bind::<Text, _>(dataset.as_str())
        .load(conn)
        .await?;
    let physical_types: HashMap<String, ColumnType> = physical
        .into_iter()
        .map(|c| {
            (
                c.column_name,
                inference::column_type_from_physical(&c.data_type),
            )
        })
        .collect();

    let junction = dataset.with_suffix("_connection")?;

    // Rows arrive as whole-row JSONB objects; only the version's recorded
    // columns are projected below, so historical-only columns never leak.
    let rows: Vec<VersionDataRow> =
        diesel::sql_query(dialect.select_version_rows(dataset, &junction))
            .bind::<Integer, _>(version_id)
            .load(conn)
            .await?;
    debug!(
        "Version {} of {}: {} rows across {} columns",
        version_id,
        dataset,
        rows.len(),
        column_names.len()
    );

    let mut row_ids = Vec::with_capacity(rows.len());
    let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); column_names.len()];
    for row in &rows {
        row_ids.push(Value::Int(row.row_id));
        for (i, name) in column_names.iter().enumerate() {
            let ty = physical_types
                .get(name)
                .copied()
                .ok_or_else(|| VersioningError::SchemaFailure {
                    message: format!("column '{}' missing from canonical table", name),
                })?;
            let cell = row
                .row_data
                .get(name)
                .unwrap_or(&serde_json::Value::Null);
            cells[i].push(Value::from_json(cell, ty, name)?);
        }
    }

    let mut columns = Vec::with_capacity(column_names.len() + 1);
    columns.push(Column::new("row_id", ColumnType::BigInt, row_ids));
    for (name, values) in column_names.iter().zip(cells) {
        let ty = physical_types.get(name).copied().ok_or_else(|| {
            VersioningError::SchemaFailure {
                message: format!("column '{}' missing from canonical table", name),
            }
        })?;
        columns.push(Column::new(name.clone(), ty, values));
    }
    Table::new(columns)
}
