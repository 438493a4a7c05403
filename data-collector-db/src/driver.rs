//! One-time SQLite library check.
//!
//! Dependency rows are written with `INSERT ... ON CONFLICT DO UPDATE`,
//! which needs SQLite 3.24.0. Column lookups use the `pragma_table_info`
//! table-valued function, available since 3.16.0 and so covered by the
//! same floor. The check runs once per process; later calls return the
//! cached outcome.

use std::sync::OnceLock;

use crate::error::DbError;

/// Oldest SQLite release with upsert support (3.24.0).
pub const MIN_SQLITE_VERSION: i32 = 3_024_000;

const MIN_SQLITE_VERSION_TEXT: &str = "3.24.0";

static DRIVER: OnceLock<Result<(), String>> = OnceLock::new();

/// Verify the linked SQLite library. Safe to call from any thread, any
/// number of times.
pub fn init_driver() -> Result<(), DbError> {
    DRIVER
        .get_or_init(|| {
            let found = rusqlite::version_number();
            if found < MIN_SQLITE_VERSION {
                Err(rusqlite::version().to_string())
            } else {
                log::debug!("SQLite {} ready", rusqlite::version());
                Ok(())
            }
        })
        .clone()
        .map_err(|found| DbError::Driver {
            found,
            required: MIN_SQLITE_VERSION_TEXT,
        })
}
