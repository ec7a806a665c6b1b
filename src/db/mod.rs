pub mod context;
pub mod sqlite;
pub mod repository;

pub use context::SettingsContext;
pub use sqlite::*;
pub use repository::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid stored value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Settings context is no longer running")]
    ContextClosed,

    #[error("Failed to start settings context: {0}")]
    ContextSpawn(String),
}
