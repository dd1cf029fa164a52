use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::catalog::{DatasetEntry, VersionInfo};
use crate::schema::{column_definitions, dataset_versions, datasets};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(primary_key(name))]
pub struct DatasetRow {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDataset<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = dataset_versions)]
#[diesel(belongs_to(DatasetRow, foreign_key = dataset_name))]
pub struct DatasetVersionRow {
    pub id: i32,
    pub dataset_name: String,
    pub version_number: i32,
    pub created_at: DateTime<Utc>,
    pub description: String,
}

#[derive(Insertable)]
#[diesel(table_name = dataset_versions)]
pub struct NewDatasetVersion<'a> {
    pub dataset_name: &'a str,
    pub version_number: i32,
    pub created_at: DateTime<Utc>,
    pub description: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = column_definitions)]
pub struct NewColumnDefinition<'a> {
    pub version_id: i32,
    pub column_name: &'a str,
}

impl From<DatasetRow> for DatasetEntry {
    fn from(row: DatasetRow) -> Self {
        DatasetEntry {
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl DatasetVersionRow {
    pub fn into_info(self, column_count: i64) -> VersionInfo {
        VersionInfo {
            version_id: self.id,
            version_number: self.version_number,
            created_at: self.created_at,
            description: self.description,
            column_count,
        }
    }
}
