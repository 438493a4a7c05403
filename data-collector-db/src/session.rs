//! Scoped transactional sessions.
//!
//! A [`Session`] owns one SQLite transaction. Dropping it without calling
//! [`Session::commit`] rolls the transaction back, so every early return
//! or `?` inside a unit of work leaves the store unchanged.
//! [`Database::with_session`](crate::Database::with_session) wraps the
//! common commit-on-success, rollback-on-error shape.
//!
//! Dependency registrations written inside a session are staged on it and
//! only reach the tracker's run registry when the session commits.

use std::cell::RefCell;

use rusqlite::{Connection, Transaction};

use crate::error::DbError;
use crate::store::RecordStore;
use crate::tracker::{DbObject, DependencyRegistry, DependencyTracker};

/// One unit of work against the store.
pub struct Session<'db> {
    tx: Transaction<'db>,
    tracker: &'db DependencyTracker,
    staged: RefCell<DependencyRegistry>,
    name: Option<String>,
}

impl<'db> Session<'db> {
    /// Begin a deferred transaction on `conn`. Nested sessions on the same
    /// connection are rejected by SQLite, not detected here.
    pub(crate) fn begin(
        conn: &'db Connection,
        tracker: &'db DependencyTracker,
        name: Option<&str>,
    ) -> Result<Self, DbError> {
        let tx = conn.unchecked_transaction()?;
        let session = Self {
            tx,
            tracker,
            staged: RefCell::new(DependencyRegistry::new()),
            name: name.map(str::to_string),
        };
        log::debug!("Session {} opened", session.label());
        Ok(session)
    }

    /// Diagnostic name given at acquisition.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The store operations run through.
    pub fn store(&self) -> &dyn RecordStore {
        &*self.tx
    }

    /// The underlying connection, for raw SQL inside the same transaction.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    /// Commit the transaction, then hand staged registrations to the run.
    pub fn commit(self) -> Result<(), DbError> {
        let label = self.label();
        let Self {
            tx,
            tracker,
            staged,
            ..
        } = self;
        tx.commit()?;
        tracker.promote(staged.into_inner());
        log::debug!("Session {} committed", label);
        Ok(())
    }

    /// Roll back the transaction. Staged registrations are discarded.
    pub fn rollback(self) -> Result<(), DbError> {
        let label = self.label();
        let discarded = self.staged.borrow().len();
        self.tx.rollback()?;
        log::debug!(
            "Session {} rolled back, {} staged registrations dropped",
            label,
            discarded
        );
        Ok(())
    }

    /// Whether a dependency row for `key` was written in this session.
    pub(crate) fn is_staged(&self, key: &str) -> bool {
        self.staged.borrow().contains(key)
    }

    pub(crate) fn stage(&self, object: DbObject) {
        self.staged.borrow_mut().insert(object);
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("'{}'", name),
            None => "<unnamed>".to_string(),
        }
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("name", &self.name).finish()
    }
}
