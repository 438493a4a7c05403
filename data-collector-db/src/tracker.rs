//! Run-scoped tracking of the database objects an application touches.
//!
//! Each distinct table, view, or routine is written to `app_db_objects` at
//! most once per run. Batch operations collect objects into a caller-owned
//! [`DependencyRegistry`] and flush it once at the end, so one logical
//! operation never writes the same object twice.
//!
//! A write is staged on the session that made it and joins the run registry
//! when that session commits. A rolled-back registration is written again
//! by the next session that touches the object.

use std::cell::RefCell;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use data_collector_core::{make_hash, HashOptions, RecordType, Value};

use crate::error::DbError;
use crate::session::Session;
use crate::settings::DatabaseSettings;
use crate::sqlite::DEFAULT_SCHEMA;
use crate::store::{DependencyRow, ObjectKind};

/// Server type recorded for every dependency row.
pub const SERVER_TYPE: &str = "sqlite";

/// A database object an application depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbObject {
    pub database_name: String,
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
}

impl DbObject {
    /// `database.schema.name`, the registry key.
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.database_name, self.schema, self.name)
    }
}

/// Set of distinct objects, keyed by qualified name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyRegistry {
    objects: BTreeMap<String, DbObject>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Add an object. Returns false if one with the same key was already present.
    pub fn insert(&mut self, object: DbObject) -> bool {
        let key = object.key();
        if self.objects.contains_key(&key) {
            return false;
        }
        self.objects.insert(key, object);
        true
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &DbObject> {
        self.objects.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}

/// Writes dependency metadata for one application, deduplicated per run.
#[derive(Debug)]
pub struct DependencyTracker {
    map_objects: bool,
    app_id: Option<String>,
    server_name: Option<String>,
    database_name: String,
    run: RefCell<DependencyRegistry>,
}

impl DependencyTracker {
    pub fn new(settings: &DatabaseSettings, app_id: Option<String>) -> Self {
        Self {
            map_objects: settings.map_objects,
            app_id,
            server_name: settings.server_name.clone(),
            database_name: settings.database_name.clone(),
            run: RefCell::new(DependencyRegistry::new()),
        }
    }

    /// Tracking needs both the `map_objects` setting and a bound application.
    pub fn is_active(&self) -> bool {
        self.map_objects && self.app_id.is_some()
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Snapshot of everything registered and committed so far in this run.
    pub fn registered(&self) -> DependencyRegistry {
        self.run.borrow().clone()
    }

    /// Start a new run: forget what has been registered.
    pub fn reset(&self) {
        self.run.borrow_mut().objects.clear();
    }

    /// Register record types (tables or views).
    pub fn register_models<'a>(
        &self,
        session: &Session<'_>,
        models: impl IntoIterator<Item = &'a RecordType>,
    ) -> Result<usize, DbError> {
        if !self.is_active() {
            return Ok(0);
        }
        let mut seen = DependencyRegistry::new();
        self.track_models(session, models, &mut seen)?;
        self.flush(session, &seen)
    }

    /// Register objects by free-text name (`name`, `schema.name`, or
    /// `database.schema.name`), classified through the store catalogue.
    pub fn register_sql_objects(
        &self,
        session: &Session<'_>,
        names: &[&str],
    ) -> Result<usize, DbError> {
        if !self.is_active() {
            return Ok(0);
        }
        let mut seen = DependencyRegistry::new();
        for name in names {
            let mut object = self.resolve_name(name, ObjectKind::Unknown);
            if self.is_new(&object.key(), &seen) {
                let target = RecordType::new(object.name.clone()).in_schema(object.schema.clone());
                object.kind = session.store().object_kind(&target)?;
                self.inspect([object], &mut seen);
            }
        }
        self.flush(session, &seen)
    }

    /// Register a routine whose kind is known from how it was invoked.
    pub(crate) fn register_routine(
        &self,
        session: &Session<'_>,
        name: &str,
        kind: ObjectKind,
    ) -> Result<usize, DbError> {
        if !self.is_active() {
            return Ok(0);
        }
        let mut seen = DependencyRegistry::new();
        self.inspect([self.resolve_name(name, kind)], &mut seen);
        self.flush(session, &seen)
    }

    /// Resolve record types into `seen` without writing anything. Types
    /// already in `seen` or registered this run skip the catalogue lookup.
    pub fn track_models<'a>(
        &self,
        session: &Session<'_>,
        models: impl IntoIterator<Item = &'a RecordType>,
        seen: &mut DependencyRegistry,
    ) -> Result<usize, DbError> {
        let mut added = 0;
        for model in models {
            let mut object = DbObject {
                database_name: self.database_name.clone(),
                schema: model.schema.clone().unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
                name: model.name.clone(),
                kind: ObjectKind::Unknown,
            };
            if !self.is_new(&object.key(), seen) || session.is_staged(&object.key()) {
                continue;
            }
            object.kind = session.store().object_kind(model)?;
            added += self.inspect([object], seen);
        }
        Ok(added)
    }

    /// Add to `seen` every object neither `seen` nor this run already holds.
    /// Returns how many were added.
    pub fn inspect(
        &self,
        objects: impl IntoIterator<Item = DbObject>,
        seen: &mut DependencyRegistry,
    ) -> usize {
        let mut added = 0;
        for object in objects {
            if self.is_new(&object.key(), seen) && seen.insert(object) {
                added += 1;
            }
        }
        added
    }

    /// Write one metadata row for every object in `seen` that neither this
    /// run nor `session` has registered yet. Failures propagate; the write
    /// shares the caller's transaction and is staged on it.
    pub fn flush(&self, session: &Session<'_>, seen: &DependencyRegistry) -> Result<usize, DbError> {
        let Some(app_id) = self.app_id.as_deref().filter(|_| self.map_objects) else {
            return Ok(0);
        };

        let now = chrono::Local::now().naive_local();
        let mut written = 0;
        for object in seen.objects() {
            let key = object.key();
            if self.run.borrow().contains(&key) || session.is_staged(&key) {
                continue;
            }
            session
                .store()
                .write_dependency(&self.dependency_row(app_id, object, now))?;
            log::debug!("Registered {} {} for app {}", object.kind, key, app_id);
            session.stage(object.clone());
            written += 1;
        }
        Ok(written)
    }

    /// Move a committed session's registrations into the run registry.
    pub(crate) fn promote(&self, staged: DependencyRegistry) {
        let mut run = self.run.borrow_mut();
        for object in staged.objects.into_values() {
            run.insert(object);
        }
    }

    fn is_new(&self, key: &str, seen: &DependencyRegistry) -> bool {
        !seen.contains(key) && !self.run.borrow().contains(key)
    }

    /// Split a dotted name into database, schema, and object parts.
    fn resolve_name(&self, name: &str, kind: ObjectKind) -> DbObject {
        let parts: Vec<&str> = name.split('.').collect();
        let (database, schema, object) = match parts.as_slice() {
            [object] => (None, None, *object),
            [schema, object] => (None, Some(*schema), *object),
            [.., database, schema, object] => (Some(*database), Some(*schema), *object),
            [] => (None, None, name),
        };
        DbObject {
            database_name: database
                .filter(|d| !d.is_empty())
                .unwrap_or(&self.database_name)
                .to_string(),
            schema: schema
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SCHEMA)
                .to_string(),
            name: object.to_string(),
            kind,
        }
    }

    fn dependency_row(&self, app_id: &str, object: &DbObject, now: NaiveDateTime) -> DependencyRow {
        let mut identity = BTreeMap::new();
        identity.insert("app_id".to_string(), Value::from(app_id));
        identity.insert("server_type".to_string(), Value::from(SERVER_TYPE));
        identity.insert("server_name".to_string(), Value::from(self.server_name.clone()));
        identity.insert("database_name".to_string(), Value::from(object.database_name.as_str()));
        identity.insert("database_schema".to_string(), Value::from(object.schema.as_str()));
        identity.insert("object_name".to_string(), Value::from(object.name.as_str()));
        identity.insert("object_type".to_string(), Value::from(object.kind.as_str()));

        DependencyRow {
            app_id: app_id.to_string(),
            server_type: SERVER_TYPE.to_string(),
            server_name: self.server_name.clone(),
            database_name: object.database_name.clone(),
            database_schema: object.schema.clone(),
            object_name: object.name.clone(),
            object_type: object.kind,
            sha: make_hash(&identity, &HashOptions::default()),
            last_use_date: now,
        }
    }
}
