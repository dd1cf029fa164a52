use serde::{Deserialize, Serialize};

use crate::error::VersioningError;

/// Backend families the dialect can emit statements for. Only Postgres is
/// exercised end-to-end; new variants extend the match arms below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
}

/// A validated SQL identifier. Identifiers cannot be parameter-bound, so
/// every dynamic table or column name must pass through this allow-list
/// before it reaches statement text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(raw: &str) -> Result<Self, VersioningError> {
        let valid_start = raw
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || raw.len() > 63 {
            return Err(VersioningError::SchemaFailure {
                message: format!("invalid SQL identifier: '{}'", raw),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Identifier known to be valid at compile time (catalog table and
    /// surrogate-key names).
    pub(crate) fn fixed(raw: &'static str) -> Self {
        debug_assert!(Ident::new(raw).is_ok());
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives a related identifier such as `<dataset>_connection`. Fails
    /// if the combined name would exceed the identifier length limit.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, VersioningError> {
        Ident::new(&format!("{}{}", self.0, suffix))
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-independent column types produced by the type inferrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    BigInt,
    DoublePrecision,
    Boolean,
    VarChar255,
    Text,
    TimestampTz,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: Ident,
    pub ty: SqlType,
}

/// Column constraint fragments for `create_table_if_not_exists`.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: Ident,
    pub definition: String,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: Ident,
    pub references_table: Ident,
    pub references_column: Ident,
}

/// One side of a junction link comparison: columns the current upload
/// carries are value-compared, historical-only columns must be NULL on the
/// canonical row.
#[derive(Debug, Clone)]
pub struct LinkColumn {
    pub name: Ident,
    pub in_current: bool,
}

/// Statement builder for one backend. Pure and stateless; every method
/// returns SQL text with data values left as bind placeholders.
#[derive(Debug, Clone, Copy)]
pub struct SqlDialect {
    backend: BackendKind,
}

impl SqlDialect {
    pub fn new(backend: BackendKind) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    fn quote(&self, ident: &Ident) -> String {
        match self.backend {
            BackendKind::Postgres => format!("\"{}\"", ident.as_str()),
        }
    }

    pub fn render_type(&self, ty: SqlType) -> &'static str {
        match self.backend {
            BackendKind::Postgres => match ty {
                SqlType::Integer => "integer",
                SqlType::BigInt => "bigint",
                SqlType::DoublePrecision => "double precision",
                SqlType::Boolean => "boolean",
                SqlType::VarChar255 => "varchar(255)",
                SqlType::Text => "text",
                SqlType::TimestampTz => "timestamptz",
            },
        }
    }

    /// Not transactional on Postgres; the caller treats a duplicate
    /// database as success.
    pub fn create_database_if_not_exists(&self, database: &Ident) -> String {
        match self.backend {
            BackendKind::Postgres => format!("CREATE DATABASE {}", self.quote(database)),
        }
    }

    pub fn create_table_if_not_exists(
        &self,
        table: &Ident,
        columns: &[TableColumn],
        primary_key: &[Ident],
        foreign_keys: &[ForeignKey],
    ) -> String {
        match self.backend {
            BackendKind::Postgres => {
                let mut defs: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} {}", self.quote(&c.name), c.definition))
                    .collect();
                if !primary_key.is_empty() {
                    let pk = primary_key
                        .iter()
                        .map(|c| self.quote(c))
                        .collect::<Vec<_>>()
                        .join(", ");
                    defs.push(format!("PRIMARY KEY ({})", pk));
                }
                for fk in foreign_keys {
                    defs.push(format!(
                        "FOREIGN KEY ({}) REFERENCES {}({})",
                        self.quote(&fk.column),
                        self.quote(&fk.references_table),
                        self.quote(&fk.references_column)
                    ));
                }
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    self.quote(table),
                    defs.join(", ")
                )
            }
        }
    }

    pub fn alter_table_add_columns(&self, table: &Ident, columns: &[ColumnDef]) -> String {
        match self.backend {
            BackendKind::Postgres => {
                let adds = columns
                    .iter()
                    .map(|c| {
                        format!(
                            "ADD COLUMN {} {}",
                            self.quote(&c.name),
                            self.render_type(c.ty)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("ALTER TABLE {} {}", self.quote(table), adds)
            }
        }
    }

    /// Session-scoped staging table, dropped with the surrounding
    /// transaction whether it commits or aborts.
    pub fn create_staging_table(&self, table: &Ident, columns: &[ColumnDef]) -> String {
        match self.backend {
            BackendKind::Postgres => {
                let defs = columns
                    .iter()
                    .map(|c| format!("{} {}", self.quote(&c.name), self.render_type(c.ty)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "CREATE TEMP TABLE {} (row_id bigserial PRIMARY KEY, {}) ON COMMIT DROP",
                    self.quote(table),
                    defs
                )
            }
        }
    }

    /// Bulk load: one JSONB array bind expanded into typed rows. Keeps all
    /// data values out of the statement text.
    pub fn stage_rows(&self, staging: &Ident, columns: &[ColumnDef]) -> String {
        match self.backend {
            BackendKind::Postgres => {
                let targets = columns
                    .iter()
                    .map(|c| self.quote(&c.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sources = columns
                    .iter()
                    .map(|c| {
                        format!(
                            "(e->>'{}')::{}",
                            c.name.as_str(),
                            self.render_type(c.ty)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "INSERT INTO {} ({}) SELECT {} FROM jsonb_array_elements($1) AS e",
                    self.quote(staging),
                    targets,
                    sources
                )
            }
        }
    }

    /// Canonical insert. An empty `comparison` list means deduplication is
    /// disabled and every staged row is copied over.
    pub fn insert_novel_rows(
        &self,
        canonical: &Ident,
        staging: &Ident,
        current: &[Ident],
        comparison: &[Ident],
    ) -> String {
        match self.backend {
            BackendKind::Postgres => {
                let targets = current
                    .iter()
                    .map(|c| self.quote(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sources = current
                    .iter()
                    .map(|c| format!("s.{}", self.quote(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql = format!(
                    "INSERT INTO {} ({}) SELECT {} FROM {} s",
                    self.quote(canonical),
                    targets,
                    sources,
                    self.quote(staging)
                );
                if !comparison.is_empty() {
                    let matches = comparison
                        .iter()
                        .map(|c| {
                            format!(
                                "m.{q} IS NOT DISTINCT FROM s.{q}",
                                q = self.quote(c)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    sql.push_str(&format!(
                        " WHERE NOT EXISTS (SELECT 1 FROM {} m WHERE {})",
                        self.quote(canonical),
                        matches
                    ));
                }
                sql
            }
        }
    }

    /// Junction insert linking every canonical row that matches a staged
    /// row across the historical/current column union. `$1` is the version
    /// id. DISTINCT guards the composite key against uploads containing
    /// internally identical rows.
    pub fn link_version_rows(
        &self,
        canonical: &Ident,
        junction: &Ident,
        staging: &Ident,
        columns: &[LinkColumn],
    ) -> String {
        match self.backend {
            BackendKind::Postgres => {
                let on = columns
                    .iter()
                    .map(|c| {
                        let q = self.quote(&c.name);
                        if c.in_current {
                            format!("m.{q} IS NOT DISTINCT FROM s.{q}", q = q)
                        } else {
                            format!("m.{} IS NULL", q)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!(
                    "INSERT INTO {} (row_id, version_id) \
                     SELECT DISTINCT m.row_id, $1 FROM {} m JOIN {} s ON {}",
                    self.quote(junction),
                    self.quote(canonical),
                    self.quote(staging),
                    on
                )
            }
        }
    }

    /// Reconstruction select: rows carried back as whole-row JSONB
    /// objects, in row-id order. The caller projects the version's
    /// recorded columns out of each object, so the statement stays
    /// independent of the column count. `$1` is the version id.
    pub fn select_version_rows(&self, canonical: &Ident, junction: &Ident) -> String {
        match self.backend {
            BackendKind::Postgres => {
                format!(
                    "SELECT m.row_id, to_jsonb(m) AS row_data \
                     FROM {} m JOIN {} c ON m.row_id = c.row_id \
                     WHERE c.version_id = $1 ORDER BY m.row_id",
                    self.quote(canonical),
                    self.quote(junction)
                )
            }
        }
    }

    /// Physical column types of a table, for re-typing rows on read. `$1`
    /// is the unquoted table name.
    pub fn select_physical_columns(&self) -> &'static str {
        match self.backend {
            BackendKind::Postgres => {
                "SELECT column_name::text AS column_name, data_type::text AS data_type \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
        }
    }

    /// Serializes ingestions per dataset for the rest of the transaction.
    /// `$1` is the dataset name.
    pub fn acquire_dataset_lock(&self) -> &'static str {
        match self.backend {
            BackendKind::Postgres => "SELECT pg_advisory_xact_lock(hashtext($1))",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> SqlDialect {
        SqlDialect::new(BackendKind::Postgres)
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    #[test]
    fn ident_rejects_hostile_input() {
        assert!(Ident::new("sales").is_ok());
        assert!(Ident::new("_private2").is_ok());
        assert!(Ident::new("").is_err());
        assert!(Ident::new("1abc").is_err());
        assert!(Ident::new("a;DROP TABLE x").is_err());
        assert!(Ident::new("a\"b").is_err());
        assert!(Ident::new(&"x".repeat(64)).is_err());
    }

    #[test]
    fn create_table_renders_keys_and_references() {
        let sql = dialect().create_table_if_not_exists(
            &ident("sales_connection"),
            &[
                TableColumn {
                    name: ident("row_id"),
                    definition: "bigint NOT NULL".to_string(),
                },
                TableColumn {
                    name: ident("version_id"),
                    definition: "integer NOT NULL".to_string(),
                },
            ],
            &[ident("row_id"), ident("version_id")],
            &[ForeignKey {
                column: ident("row_id"),
                references_table: ident("sales"),
                references_column: ident("row_id"),
            }],
        );
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"sales_connection\""));
        assert!(sql.contains("PRIMARY KEY (\"row_id\", \"version_id\")"));
        assert!(sql.contains("FOREIGN KEY (\"row_id\") REFERENCES \"sales\"(\"row_id\")"));
    }

    #[test]
    fn staging_table_is_temp_and_transaction_scoped() {
        let sql = dialect().create_staging_table(
            &ident("sales_staging_ab12"),
            &[ColumnDef {
                name: ident("amount"),
                ty: SqlType::DoublePrecision,
            }],
        );
        assert!(sql.starts_with("CREATE TEMP TABLE"));
        assert!(sql.ends_with("ON COMMIT DROP"));
        assert!(sql.contains("\"amount\" double precision"));
    }

    #[test]
    fn stage_rows_binds_a_single_jsonb_array() {
        let sql = dialect().stage_rows(
            &ident("t"),
            &[
                ColumnDef {
                    name: ident("id"),
                    ty: SqlType::BigInt,
                },
                ColumnDef {
                    name: ident("seen_at"),
                    ty: SqlType::TimestampTz,
                },
            ],
        );
        assert!(sql.contains("jsonb_array_elements($1)"));
        assert!(sql.contains("(e->>'id')::bigint"));
        assert!(sql.contains("(e->>'seen_at')::timestamptz"));
    }

    #[test]
    fn dedup_insert_uses_null_safe_anti_join() {
        let sql = dialect().insert_novel_rows(
            &ident("sales"),
            &ident("stg"),
            &[ident("id"), ident("amount")],
            &[ident("id"), ident("amount")],
        );
        assert!(sql.contains("NOT EXISTS"));
        assert!(sql.contains("m.\"id\" IS NOT DISTINCT FROM s.\"id\""));
    }

    #[test]
    fn disabled_dedup_copies_everything() {
        let sql = dialect().insert_novel_rows(
            &ident("sales"),
            &ident("stg"),
            &[ident("id")],
            &[],
        );
        assert!(!sql.contains("NOT EXISTS"));
    }

    #[test]
    fn link_requires_null_for_historical_only_columns() {
        let sql = dialect().link_version_rows(
            &ident("sales"),
            &ident("sales_connection"),
            &ident("stg"),
            &[
                LinkColumn {
                    name: ident("id"),
                    in_current: true,
                },
                LinkColumn {
                    name: ident("region"),
                    in_current: false,
                },
            ],
        );
        assert!(sql.contains("SELECT DISTINCT m.row_id, $1"));
        assert!(sql.contains("m.\"id\" IS NOT DISTINCT FROM s.\"id\""));
        assert!(sql.contains("m.\"region\" IS NULL"));
    }

    #[test]
    fn version_select_carries_whole_rows_in_row_id_order() {
        let sql = dialect().select_version_rows(&ident("sales"), &ident("sales_connection"));
        assert!(sql.contains("to_jsonb(m) AS row_data"));
        assert!(sql.contains("WHERE c.version_id = $1"));
        assert!(sql.ends_with("ORDER BY m.row_id"));
    }
}
