//! Reconciliation of an incoming dataset against the active records of one
//! record type, keeping history in the archive column.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use data_collector_core::{CompareKey, Dataset, KeyTuple, Record, RecordType};

use crate::bulk::{archive_records, delete_records, insert_records, run_time};
use crate::database::Database;
use crate::error::{ConfigError, DbError};
use crate::session::Session;
use crate::store::{Column, Filter};
use crate::tracker::DependencyRegistry;

/// Default name of the archive-marker column.
pub const DEFAULT_ARCHIVE_COLUMN: &str = "archive";

/// Options for [`Database::merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Extra scope for the active set, ANDed with the null-archive predicate.
    pub filters: Filter,
    pub archive_col: String,
    /// Retire by deleting.
    pub delete: bool,
    /// Retire by setting the archive column.
    pub update: bool,
    /// Timestamp written on retirement. Defaults to the local time at the
    /// start of the call.
    pub archive_date: Option<NaiveDateTime>,
    pub compare_key: CompareKey,
    /// Return [`MergeStats`] from the call.
    pub stats: bool,
    /// Record type to reconcile. Inferred from the first record when unset.
    pub record_type: Option<RecordType>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            filters: Filter::all(),
            archive_col: DEFAULT_ARCHIVE_COLUMN.to_string(),
            delete: false,
            update: true,
            archive_date: None,
            compare_key: CompareKey::default(),
            stats: false,
            record_type: None,
        }
    }
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: Filter) -> Self {
        self.filters = filters;
        self
    }

    pub fn archive_col(mut self, column: impl Into<String>) -> Self {
        self.archive_col = column.into();
        self
    }

    /// Retire by deleting instead of archiving.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self.update = false;
        self
    }

    /// Detect retirements without applying them.
    pub fn keep_retired(mut self) -> Self {
        self.delete = false;
        self.update = false;
        self
    }

    pub fn archive_date(mut self, date: NaiveDateTime) -> Self {
        self.archive_date = Some(date);
        self
    }

    pub fn compare_key(mut self, key: impl Into<CompareKey>) -> Self {
        self.compare_key = key.into();
        self
    }

    pub fn with_stats(mut self) -> Self {
        self.stats = true;
        self
    }

    pub fn record_type(mut self, record_type: impl Into<RecordType>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }
}

/// Counters for one merge or update-insert call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeStats {
    pub inserted: usize,
    pub archived: usize,
    pub deleted: usize,
    pub updated: usize,
    /// Active records after the call.
    pub number_of_records: usize,
    /// Inserted records, with their store-assigned identifiers.
    pub inserted_records: Vec<Record>,
}

impl Database {
    /// Reconcile `objects` against the active records of their type.
    ///
    /// Incoming records whose compare key is not active are inserted; active
    /// records whose key is absent from `objects` are retired per the
    /// options. Records sharing a key are left alone. Nothing is committed.
    pub fn merge(
        &self,
        objects: impl Into<Dataset>,
        session: &Session<'_>,
        options: &MergeOptions,
    ) -> Result<Option<MergeStats>, DbError> {
        if options.delete && options.update {
            return Err(ConfigError::ConflictingRetirePolicy.into());
        }
        if options.compare_key.is_empty() {
            return Err(ConfigError::EmptyCompareKey.into());
        }

        let incoming = objects.into().into_records();
        let record_type = match (&options.record_type, incoming.first()) {
            (Some(rt), _) => rt.clone(),
            (None, Some(first)) => first.record_type().clone(),
            (None, None) => {
                log::debug!("merge: no records and no record type, nothing to do");
                return Ok(options.stats.then(MergeStats::default));
            }
        };
        let columns = session.store().columns(&record_type)?;
        let key_columns = KeyColumns::new(&options.compare_key, &columns);
        let incoming = keyed_incoming(&record_type, incoming, &key_columns)?;

        // Run time is fixed once so every retirement in the call shares it.
        let archive_time = options.archive_date.unwrap_or_else(run_time);
        let mut seen = DependencyRegistry::new();

        let mut scope = options.filters.clone();
        if columns.iter().any(|c| c.name == options.archive_col) {
            scope = scope.is_null(options.archive_col.as_str());
        } else {
            log::debug!(
                "{} has no '{}' column; every in-scope record is active",
                record_type,
                options.archive_col
            );
        }
        let existing = self
            .query(
                session,
                std::slice::from_ref(&record_type),
                None,
                Some(&mut seen),
            )?
            .filter(scope)
            .all()?;
        let existing_count = existing.len();

        let mut existing_keyed = Vec::with_capacity(existing_count);
        for record in existing {
            existing_keyed.push((key_columns.key(&record)?, record));
        }
        let existing_keys: HashSet<&KeyTuple> = existing_keyed.iter().map(|(key, _)| key).collect();
        let incoming_keys: HashSet<&KeyTuple> = incoming.iter().map(|(key, _)| key).collect();

        let mut to_retire: Vec<Record> = existing_keyed
            .iter()
            .filter(|(key, _)| !incoming_keys.contains(key))
            .map(|(_, record)| record.clone())
            .collect();
        let to_insert: Vec<Record> = incoming
            .iter()
            .filter(|(key, _)| !existing_keys.contains(key))
            .map(|(_, record)| record.clone())
            .collect();

        let inserted = insert_records(session.store(), to_insert)?;
        if !inserted.is_empty() {
            self.tracker()
                .track_models(session, std::slice::from_ref(&record_type), &mut seen)?;
        }

        let mut stats = MergeStats {
            inserted: inserted.len(),
            ..MergeStats::default()
        };
        let mut retired = 0;
        if !to_retire.is_empty() {
            if options.delete {
                stats.deleted = delete_records(session.store(), &to_retire)?;
                retired = stats.deleted;
            } else if options.update {
                stats.archived = archive_records(
                    session.store(),
                    &mut to_retire,
                    &options.archive_col,
                    archive_time,
                )?;
                retired = stats.archived;
            } else {
                log::debug!(
                    "merge: {} {} records absent from input left active",
                    to_retire.len(),
                    record_type
                );
            }
        }

        self.tracker().flush(session, &seen)?;

        stats.number_of_records = existing_count - retired + inserted.len();
        stats.inserted_records = inserted;
        log::debug!(
            "merge {}: {} inserted, {} archived, {} deleted, {} active",
            record_type,
            stats.inserted,
            stats.archived,
            stats.deleted,
            stats.number_of_records
        );
        Ok(options.stats.then_some(stats))
    }
}

/// Compare-key columns resolved against the table, so keys are built from
/// the values as the store would return them.
struct KeyColumns<'a> {
    compare_key: &'a CompareKey,
    columns: Vec<Option<&'a Column>>,
}

impl<'a> KeyColumns<'a> {
    fn new(compare_key: &'a CompareKey, table: &'a [Column]) -> Self {
        let columns = compare_key
            .columns()
            .iter()
            .map(|name| table.iter().find(|c| &c.name == name))
            .collect();
        Self {
            compare_key,
            columns,
        }
    }

    fn key(&self, record: &Record) -> Result<KeyTuple, DbError> {
        let raw = record.key(self.compare_key).map_err(|column| {
            DbError::from(ConfigError::MissingKeyColumn {
                record_type: record.record_type().to_string(),
                column,
            })
        })?;
        Ok(raw
            .iter()
            .zip(&self.columns)
            .map(|(value, column)| match column {
                Some(column) => column.stored(value),
                None => value.clone(),
            })
            .collect())
    }
}

/// Check incoming records and pair each with its compare key. A key seen
/// twice keeps its first position and the last record's attributes.
fn keyed_incoming(
    record_type: &RecordType,
    records: Vec<Record>,
    key_columns: &KeyColumns<'_>,
) -> Result<Vec<(KeyTuple, Record)>, DbError> {
    let mut keyed: Vec<(KeyTuple, Record)> = Vec::with_capacity(records.len());
    let mut positions: HashMap<KeyTuple, usize> = HashMap::new();

    for record in records {
        if record.record_type() != record_type {
            return Err(ConfigError::MixedRecordTypes {
                expected: record_type.to_string(),
                found: record.record_type().to_string(),
            }
            .into());
        }
        let key = key_columns.key(&record)?;
        match positions.get(&key) {
            Some(&i) => {
                log::warn!(
                    "Duplicate compare key {:?} in {} input; keeping the last occurrence",
                    key,
                    record_type
                );
                keyed[i].1 = record;
            }
            None => {
                positions.insert(key.clone(), keyed.len());
                keyed.push((key, record));
            }
        }
    }
    Ok(keyed)
}
