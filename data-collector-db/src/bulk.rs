//! Bulk mutators: writes with no diffing against existing state.
//!
//! None of these commit. Durability is decided by the enclosing session.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use data_collector_core::{Dataset, Record, RecordType};

use crate::database::Database;
use crate::error::{ConfigError, DbError};
use crate::merge::MergeStats;
use crate::session::Session;
use crate::store::{Column, Filter, RecordStore};
use crate::tracker::DependencyRegistry;

impl Database {
    /// Insert every record unconditionally. Returns them with their
    /// store-assigned identifiers.
    pub fn bulk_insert(
        &self,
        objects: impl Into<Dataset>,
        session: &Session<'_>,
    ) -> Result<Vec<Record>, DbError> {
        let records = objects.into().into_records();
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = insert_records(session.store(), records)?;
        self.tracker().register_models(session, &distinct_types(&inserted))?;
        log::debug!("Bulk inserted {} records", inserted.len());
        Ok(inserted)
    }

    /// Remove identified records.
    pub fn delete(&self, objects: &[Record], session: &Session<'_>) -> Result<usize, DbError> {
        if objects.is_empty() {
            return Ok(0);
        }
        let deleted = delete_records(session.store(), objects)?;
        self.tracker().register_models(session, &distinct_types(objects))?;
        Ok(deleted)
    }

    /// Set `archive_col` on identified records to `archive_date`, or now.
    /// Records are not checked for being active.
    pub fn archive(
        &self,
        objects: &mut [Record],
        session: &Session<'_>,
        archive_col: &str,
        archive_date: Option<NaiveDateTime>,
    ) -> Result<usize, DbError> {
        if objects.is_empty() {
            return Ok(0);
        }
        let when = archive_date.unwrap_or_else(run_time);
        let archived = archive_records(session.store(), objects, archive_col, when)?;
        self.tracker().register_models(session, &distinct_types(objects))?;
        Ok(archived)
    }

    /// Attribute-equality upsert.
    ///
    /// For each record, stored records whose `filter_cols` all equal the
    /// record's values are overwritten in place; when none match the record
    /// is inserted. Only stored records whose attributes actually changed
    /// count as updated, and only the changed columns are written.
    pub fn update_insert(
        &self,
        objects: impl Into<Dataset>,
        session: &Session<'_>,
        filter_cols: &[&str],
    ) -> Result<MergeStats, DbError> {
        if filter_cols.is_empty() {
            return Err(ConfigError::NoFilterColumns.into());
        }
        let records = objects.into().into_records();
        let mut stats = MergeStats {
            number_of_records: records.len(),
            ..MergeStats::default()
        };
        if records.is_empty() {
            return Ok(stats);
        }

        let mut seen = DependencyRegistry::new();
        let mut table: HashMap<RecordType, Vec<Column>> = HashMap::new();
        for mut record in records {
            let mut filter = Filter::all();
            for column in filter_cols {
                let value = record.get(column).cloned().ok_or_else(|| {
                    ConfigError::MissingKeyColumn {
                        record_type: record.record_type().to_string(),
                        column: column.to_string(),
                    }
                })?;
                filter = filter.eq(*column, value);
            }

            let existing = self
                .query(
                    session,
                    std::slice::from_ref(record.record_type()),
                    None,
                    Some(&mut seen),
                )?
                .filter(filter)
                .all()?;

            if existing.is_empty() {
                record.set_id(session.store().insert(&record)?);
                stats.inserted += 1;
                stats.inserted_records.push(record);
                continue;
            }

            if !table.contains_key(record.record_type()) {
                let columns = session.store().columns(record.record_type())?;
                table.insert(record.record_type().clone(), columns);
            }
            let columns = table.get(record.record_type()).map(Vec::as_slice).unwrap_or(&[]);

            for mut current in existing {
                let mut changed = Vec::new();
                for (column, value) in record.values() {
                    let Some(old) = current.get(column) else {
                        continue;
                    };
                    let incoming = match columns.iter().find(|c| &c.name == column) {
                        Some(def) => def.stored(value),
                        None => value.clone(),
                    };
                    if *old != incoming {
                        changed.push(column.as_str());
                    }
                }
                if changed.is_empty() {
                    continue;
                }
                for column in &changed {
                    if let Some(value) = record.get(column) {
                        current.set(*column, value.clone());
                    }
                }
                session.store().update_columns(&current, &changed)?;
                stats.updated += 1;
            }
        }

        self.tracker().flush(session, &seen)?;
        log::debug!(
            "update_insert: {} inserted, {} updated of {}",
            stats.inserted,
            stats.updated,
            stats.number_of_records
        );
        Ok(stats)
    }
}

// ── Shared Helpers ──────────────────────────────────────────────────────────

/// Local wall-clock time, the default archive timestamp.
pub(crate) fn run_time() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub(crate) fn insert_records(
    store: &dyn RecordStore,
    records: Vec<Record>,
) -> Result<Vec<Record>, DbError> {
    records
        .into_iter()
        .map(|mut record| {
            record.set_id(store.insert(&record)?);
            Ok(record)
        })
        .collect()
}

pub(crate) fn delete_records(store: &dyn RecordStore, records: &[Record]) -> Result<usize, DbError> {
    for record in records {
        store.delete(record)?;
    }
    Ok(records.len())
}

pub(crate) fn archive_records(
    store: &dyn RecordStore,
    records: &mut [Record],
    archive_col: &str,
    when: NaiveDateTime,
) -> Result<usize, DbError> {
    for record in records.iter_mut() {
        record.set(archive_col, when);
        store.update_columns(record, &[archive_col])?;
    }
    Ok(records.len())
}

fn distinct_types(records: &[Record]) -> Vec<RecordType> {
    records
        .iter()
        .map(|r| r.record_type().clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
