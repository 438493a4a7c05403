//! Query facade: filtered reads that feed the dependency tracker.

use data_collector_core::{Record, RecordType, Value};

use crate::database::Database;
use crate::error::{ConfigError, DbError};
use crate::session::Session;
use crate::store::{Filter, RecordStore};
use crate::tracker::DependencyRegistry;

impl Database {
    /// Start a read over `targets`.
    ///
    /// `map_objects` defaults to on and only takes effect when the tracker is
    /// active. Tracked targets go into `track_models` when the caller passes a
    /// registry (the caller flushes it later), otherwise they are registered
    /// immediately.
    pub fn query<'s>(
        &self,
        session: &'s Session<'_>,
        targets: &[RecordType],
        map_objects: Option<bool>,
        track_models: Option<&mut DependencyRegistry>,
    ) -> Result<Query<'s>, DbError> {
        if targets.is_empty() {
            return Err(ConfigError::NoQueryTargets.into());
        }

        if map_objects.unwrap_or(true) && self.tracker().is_active() {
            match track_models {
                Some(seen) => {
                    self.tracker().track_models(session, targets, seen)?;
                }
                None => {
                    self.tracker().register_models(session, targets)?;
                }
            }
        }

        Ok(Query {
            store: session.store(),
            targets: targets.to_vec(),
            filter: Filter::all(),
        })
    }
}

/// A pending read. Predicates chain; nothing runs until [`Query::all`],
/// [`Query::first`], or [`Query::count`].
///
/// With several targets the same filter applies to each and results are
/// concatenated in target order.
pub struct Query<'s> {
    store: &'s dyn RecordStore,
    targets: Vec<RecordType>,
    filter: Filter,
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("targets", &self.targets)
            .field("filter", &self.filter)
            .finish()
    }
}

impl<'s> Query<'s> {
    pub fn targets(&self) -> &[RecordType] {
        &self.targets
    }

    pub fn current_filter(&self) -> &Filter {
        &self.filter
    }

    /// AND another filter into this query.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::all().eq(column, value))
    }

    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::all().ne(column, value))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::all().lt(column, value))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::all().gt(column, value))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::all().is_null(column))
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.filter(Filter::all().is_not_null(column))
    }

    pub fn order_by(self, column: &str) -> Self {
        self.filter(Filter::all().order_by(column))
    }

    pub fn all(&self) -> Result<Vec<Record>, DbError> {
        let mut records = Vec::new();
        for target in &self.targets {
            records.extend(self.store.select(target, &self.filter)?);
        }
        Ok(records)
    }

    pub fn first(&self) -> Result<Option<Record>, DbError> {
        Ok(self.all()?.into_iter().next())
    }

    pub fn count(&self) -> Result<usize, DbError> {
        let mut total = 0;
        for target in &self.targets {
            total += self.store.count(target, &self.filter)?;
        }
        Ok(total)
    }
}
