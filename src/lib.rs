pub mod catalog;
pub mod database;
pub mod dialect;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod inference;
pub mod manager;
pub mod models;
pub mod profiles;
pub mod reader;
pub mod schema;

pub use catalog::{DatasetEntry, VersionInfo};
pub use dialect::BackendKind;
pub use domain::{Column, ColumnType, Table, Value};
pub use error::VersioningError;
pub use ingest::IngestOutcome;
pub use manager::DatasetManager;
pub use profiles::{ConnectionProfile, ProfileStore};
