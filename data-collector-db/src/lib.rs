//! SQLite persistence layer for data-collector.
//!
//! Reconciles incoming datasets against the active records of a table
//! (keeping history through an archive-marker column), scopes every write
//! to a session, and records which database objects each application
//! touches. Backed by SQLite via rusqlite with the bundled feature.

pub mod bulk;
pub mod database;
pub mod driver;
pub mod error;
pub mod execute;
pub mod merge;
pub mod query;
pub mod schema;
pub mod session;
pub mod settings;
pub mod sqlite;
pub mod store;
pub mod tracker;

pub use database::Database;
pub use driver::{init_driver, MIN_SQLITE_VERSION};
pub use error::{ConfigError, DbError};
pub use execute::{parse_routine_call, RoutineCall};
pub use merge::{MergeOptions, MergeStats, DEFAULT_ARCHIVE_COLUMN};
pub use query::Query;
pub use schema::{open_database, open_memory, SchemaError};
pub use session::Session;
pub use settings::{DatabaseSettings, SettingsError};
pub use store::{Condition, DependencyRow, Filter, ObjectKind, Op, RecordStore};
pub use tracker::{DbObject, DependencyRegistry, DependencyTracker, SERVER_TYPE};

pub use data_collector_core::{CompareKey, Dataset, Record, RecordType, Value};
