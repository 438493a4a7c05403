//! The [`Database`] handle: one connection, its settings, and the
//! dependency tracker for the current run.

use rusqlite::Connection;

use crate::driver::init_driver;
use crate::error::DbError;
use crate::schema::{ensure_schema, open_database, open_memory};
use crate::session::Session;
use crate::settings::DatabaseSettings;
use crate::tracker::DependencyTracker;

/// Entry point for sessions, queries, and mutations.
///
/// `app_id` binds the handle to an application for dependency tracking;
/// without it tracking stays off even when `map_objects` is set.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    settings: DatabaseSettings,
    tracker: DependencyTracker,
}

impl Database {
    /// Open (or create) the database file named in `settings`.
    pub fn open(settings: DatabaseSettings, app_id: Option<String>) -> Result<Self, DbError> {
        init_driver()?;
        if let Some(parent) = settings.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = open_database(&settings.path)?;
        log::info!("Opened collector database at {}", settings.path.display());
        Ok(Self::with_connection(conn, settings, app_id))
    }

    /// In-memory database; `settings.path` is ignored.
    pub fn open_memory(settings: DatabaseSettings, app_id: Option<String>) -> Result<Self, DbError> {
        init_driver()?;
        let conn = open_memory()?;
        Ok(Self::with_connection(conn, settings, app_id))
    }

    /// Wrap an existing connection, creating the metadata schema if needed.
    pub fn from_connection(
        conn: Connection,
        settings: DatabaseSettings,
        app_id: Option<String>,
    ) -> Result<Self, DbError> {
        init_driver()?;
        ensure_schema(&conn)?;
        Ok(Self::with_connection(conn, settings, app_id))
    }

    fn with_connection(conn: Connection, settings: DatabaseSettings, app_id: Option<String>) -> Self {
        let tracker = DependencyTracker::new(&settings, app_id);
        Self {
            conn,
            settings,
            tracker,
        }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn app_id(&self) -> Option<&str> {
        self.tracker.app_id()
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Raw connection, for DDL and ad-hoc reads outside a session.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a new run: dependency registrations made so far no longer
    /// suppress writes.
    pub fn begin_run(&self) {
        self.tracker.reset();
    }

    /// Acquire a session. It rolls back unless [`Session::commit`] is called.
    pub fn create_session(&self, name: Option<&str>) -> Result<Session<'_>, DbError> {
        Session::begin(&self.conn, &self.tracker, name)
    }

    /// Run `f` inside a session: commit when it returns `Ok`, roll back and
    /// return its error unchanged when it returns `Err`.
    pub fn with_session<T, E, F>(&self, name: Option<&str>, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let session = self.create_session(name)?;
        match f(&session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback() {
                    log::warn!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}
