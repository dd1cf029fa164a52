use crate::dialect::{ColumnDef, Ident, SqlType};
use crate::domain::{Column, ColumnType, Table};
use crate::error::VersioningError;

/// Longest text value that still fits the bounded varchar type.
const BOUNDED_TEXT_LIMIT: usize = 255;

/// Maps one column to its backend-independent SQL type. Temporal columns
/// always become timestamps; text longer than the bounded limit is promoted
/// to the unbounded type; everything else goes through the fixed table.
pub fn infer_column(column: &Column) -> Result<ColumnDef, VersioningError> {
    let name = Ident::new(&column.name)?;
    let ty = match column.ty {
        ColumnType::Timestamp => SqlType::TimestampTz,
        ColumnType::Text if column.max_text_len() > BOUNDED_TEXT_LIMIT => SqlType::Text,
        ColumnType::Text => SqlType::VarChar255,
        ColumnType::Categorical => SqlType::VarChar255,
        ColumnType::Int => SqlType::Integer,
        ColumnType::BigInt => SqlType::BigInt,
        ColumnType::Double => SqlType::DoublePrecision,
        ColumnType::Bool => SqlType::Boolean,
    };
    Ok(ColumnDef { name, ty })
}

/// Infers backend types for every column of an upload, preserving column
/// order.
pub fn infer_table(table: &Table) -> Result<Vec<ColumnDef>, VersioningError> {
    table.columns().iter().map(infer_column).collect()
}

/// Reverse mapping used when re-typing rows read back from the backend.
pub fn column_type_from_physical(data_type: &str) -> ColumnType {
    match data_type {
        "integer" | "smallint" => ColumnType::Int,
        "bigint" => ColumnType::BigInt,
        "double precision" | "real" | "numeric" => ColumnType::Double,
        "boolean" => ColumnType::Bool,
        "timestamp with time zone" | "timestamp without time zone" => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;

    #[test]
    fn temporal_columns_become_timestamps() {
        let col = Column::new("seen_at", ColumnType::Timestamp, vec![Value::Null]);
        assert_eq!(infer_column(&col).unwrap().ty, SqlType::TimestampTz);
    }

    #[test]
    fn short_text_stays_bounded() {
        let col = Column::new(
            "name",
            ColumnType::Text,
            vec![Value::Text("x".repeat(255))],
        );
        assert_eq!(infer_column(&col).unwrap().ty, SqlType::VarChar255);
    }

    #[test]
    fn long_text_is_promoted_to_unbounded() {
        let col = Column::new(
            "notes",
            ColumnType::Text,
            vec![Value::Text("x".repeat(256)), Value::Null],
        );
        assert_eq!(infer_column(&col).unwrap().ty, SqlType::Text);
    }

    #[test]
    fn fixed_mappings_apply() {
        let cases = [
            (ColumnType::Int, SqlType::Integer),
            (ColumnType::BigInt, SqlType::BigInt),
            (ColumnType::Double, SqlType::DoublePrecision),
            (ColumnType::Bool, SqlType::Boolean),
            (ColumnType::Categorical, SqlType::VarChar255),
        ];
        for (input, expected) in cases {
            let col = Column::new("c", input, vec![Value::Null]);
            assert_eq!(infer_column(&col).unwrap().ty, expected);
        }
    }

    #[test]
    fn invalid_column_name_is_rejected() {
        let col = Column::new("bad name", ColumnType::Int, vec![]);
        assert!(infer_column(&col).is_err());
    }
}
