use thiserror::Error;

#[derive(Error, Debug)]
pub enum VersioningError {
    #[error("Connection failure: {message}")]
    ConnectionFailure { message: String },

    #[error("Schema failure: {message}")]
    SchemaFailure { message: String },

    #[error("Type inference failed for column '{column}': {message}")]
    TypeInference { column: String, message: String },

    #[error("Ingestion failed: {message}")]
    IngestionFailure { message: String },

    #[error("Dataset not found: {name}")]
    DatasetNotFound { name: String },

    #[error("No data for version {version_id}")]
    VersionNotFound { version_id: i32 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl From<std::io::Error> for VersioningError {
    fn from(err: std::io::Error) -> Self {
        VersioningError::ConfigError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for VersioningError {
    fn from(err: serde_json::Error) -> Self {
        VersioningError::ConfigError {
            message: err.to_string(),
        }
    }
}

impl From<diesel::result::Error> for VersioningError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => VersioningError::IngestionFailure {
                message: "expected row was not found".to_string(),
            },
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                VersioningError::IngestionFailure {
                    message: format!("uniqueness violated: {}", info.message()),
                }
            }
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                VersioningError::IngestionFailure {
                    message: format!("referential integrity violated: {}", info.message()),
                }
            }
            Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                VersioningError::ConnectionFailure {
                    message: info.message().to_string(),
                }
            }
            Error::DatabaseError(_, info) => VersioningError::SchemaFailure {
                message: info.message().to_string(),
            },
            other => VersioningError::SchemaFailure {
                message: format!("Database error: {}", other),
            },
        }
    }
}
