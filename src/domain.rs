use chrono::{DateTime, Utc};
use serde_json::{json, Map};

use crate::error::VersioningError;

/// Logical type of an uploaded column, before any backend mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    BigInt,
    Double,
    Bool,
    Text,
    Categorical,
    Timestamp,
}

/// A single cell value. `Null` is legal under every column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    fn fits(&self, ty: ColumnType) -> bool {
        match self {
            Value::Null => true,
            Value::Int(_) => matches!(ty, ColumnType::Int | ColumnType::BigInt),
            Value::Double(_) => ty == ColumnType::Double,
            Value::Bool(_) => ty == ColumnType::Bool,
            Value::Text(_) => matches!(ty, ColumnType::Text | ColumnType::Categorical),
            Value::Timestamp(_) => ty == ColumnType::Timestamp,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::Bool(v) => json!(v),
            Value::Text(v) => json!(v),
            Value::Timestamp(v) => json!(v.to_rfc3339()),
        }
    }

    /// Rebuilds a cell from a JSON value fetched back from the backend.
    pub fn from_json(
        value: &serde_json::Value,
        ty: ColumnType,
        column: &str,
    ) -> Result<Value, VersioningError> {
        let mismatch = || VersioningError::TypeInference {
            column: column.to_string(),
            message: format!("backend value {} does not match {:?}", value, ty),
        };

        match (value, ty) {
            (serde_json::Value::Null, _) => Ok(Value::Null),
            (serde_json::Value::Number(n), ColumnType::Int | ColumnType::BigInt) => {
                n.as_i64().map(Value::Int).ok_or_else(mismatch)
            }
            (serde_json::Value::Number(n), ColumnType::Double) => {
                n.as_f64().map(Value::Double).ok_or_else(mismatch)
            }
            (serde_json::Value::Bool(b), ColumnType::Bool) => Ok(Value::Bool(*b)),
            (serde_json::Value::String(s), ColumnType::Text | ColumnType::Categorical) => {
                Ok(Value::Text(s.clone()))
            }
            (serde_json::Value::String(s), ColumnType::Timestamp) => {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
                    .map_err(|_| mismatch())
            }
            _ => Err(mismatch()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            values,
        }
    }

    /// Length of the longest textual value, for the bounded/unbounded split.
    pub fn max_text_len(&self) -> usize {
        self.values
            .iter()
            .map(|v| match v {
                Value::Text(s) => s.chars().count(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }
}

/// An in-memory upload: named, typed columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, VersioningError> {
        if columns.is_empty() {
            return Err(VersioningError::TypeInference {
                column: String::new(),
                message: "a table needs at least one column".to_string(),
            });
        }

        let expected_len = columns[0].values.len();
        for column in &columns {
            if column.name.is_empty() {
                return Err(VersioningError::TypeInference {
                    column: column.name.clone(),
                    message: "column names must be non-empty".to_string(),
                });
            }
            if column.values.len() != expected_len {
                return Err(VersioningError::TypeInference {
                    column: column.name.clone(),
                    message: format!(
                        "column has {} values, expected {}",
                        column.values.len(),
                        expected_len
                    ),
                });
            }
            if let Some(bad) = column.values.iter().find(|v| !v.fits(column.ty)) {
                return Err(VersioningError::TypeInference {
                    column: column.name.clone(),
                    message: format!("value {:?} does not fit column type {:?}", bad, column.ty),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(VersioningError::TypeInference {
                    column: column.name.clone(),
                    message: "duplicate column name".to_string(),
                });
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    /// Serializes every row as a JSON object keyed by column name, the
    /// shape consumed by the staging bulk load.
    pub fn rows_as_json(&self) -> serde_json::Value {
        let mut rows = Vec::with_capacity(self.row_count());
        for i in 0..self.row_count() {
            let mut object = Map::new();
            for column in &self.columns {
                object.insert(column.name.clone(), column.values[i].to_json());
            }
            rows.push(serde_json::Value::Object(object));
        }
        serde_json::Value::Array(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn rejects_ragged_columns() {
        let result = Table::new(vec![
            Column::new("a", ColumnType::BigInt, ints(&[1, 2])),
            Column::new("b", ColumnType::BigInt, ints(&[1])),
        ]);
        assert!(matches!(
            result,
            Err(VersioningError::TypeInference { ref column, .. }) if column == "b"
        ));
    }

    #[test]
    fn rejects_value_type_mismatch() {
        let result = Table::new(vec![Column::new(
            "flag",
            ColumnType::Bool,
            vec![Value::Bool(true), Value::Int(1)],
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_column_names() {
        let result = Table::new(vec![
            Column::new("a", ColumnType::BigInt, ints(&[1])),
            Column::new("a", ColumnType::BigInt, ints(&[2])),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn nulls_fit_any_column_type() {
        let table = Table::new(vec![Column::new(
            "ts",
            ColumnType::Timestamp,
            vec![Value::Null, Value::Null],
        )])
        .unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn json_rows_round_trip_cell_values() {
        let table = Table::new(vec![
            Column::new("id", ColumnType::BigInt, ints(&[7])),
            Column::new(
                "name",
                ColumnType::Text,
                vec![Value::Text("alpha".to_string())],
            ),
            Column::new("score", ColumnType::Double, vec![Value::Null]),
        ])
        .unwrap();

        let rows = table.rows_as_json();
        let row = &rows.as_array().unwrap()[0];
        assert_eq!(row["id"], json!(7));
        assert_eq!(row["name"], json!("alpha"));
        assert!(row["score"].is_null());

        let back = Value::from_json(&row["id"], ColumnType::BigInt, "id").unwrap();
        assert_eq!(back, Value::Int(7));
    }

    #[test]
    fn timestamp_survives_json_transport() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let encoded = Value::Timestamp(ts).to_json();
        let decoded = Value::from_json(&encoded, ColumnType::Timestamp, "ts").unwrap();
        assert_eq!(decoded, Value::Timestamp(ts));
    }
}
