//! Records, record types, datasets, and compare keys.
//!
//! A [`Record`] is one row-shaped entity: the record type it belongs to, an
//! optional store-assigned identifier, and its attributes. Reconciliation
//! identifies record versions by a [`CompareKey`] over those attributes.

use std::collections::BTreeMap;
use std::fmt;

use crate::hashing::{make_hash, HashOptions, DEFAULT_HASH_COLUMN};
use crate::value::Value;

/// Name of the store-assigned identifier column.
pub const ID_COLUMN: &str = "id";

// ── Record Type ─────────────────────────────────────────────────────────────

/// Descriptor of a table or view that records are read from and written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType {
    pub name: String,
    /// Schema (attached database) the object lives in. `None` means the default.
    pub schema: Option<String>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// `schema.name`, or just `name` when no schema is set.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl From<&str> for RecordType {
    fn from(name: &str) -> Self {
        RecordType::new(name)
    }
}

// ── Record ──────────────────────────────────────────────────────────────────

/// A single row-shaped entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    record_type: RecordType,
    id: Option<i64>,
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(record_type: impl Into<RecordType>) -> Self {
        Self {
            record_type: record_type.into(),
            id: None,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set an attribute. The identifier column is routed to [`Record::set_id`].
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if column == ID_COLUMN {
            self.id = value.as_i64();
        } else {
            self.values.insert(column, value);
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Content hash over `on_keys` (all attributes when empty), ignoring the
    /// `sha` column itself.
    pub fn compute_sha(&self, on_keys: &[&str]) -> String {
        let mut options = HashOptions::default();
        if !on_keys.is_empty() {
            options = options.on_keys(on_keys);
        }
        make_hash(&self.values, &options)
    }

    /// Fill the `sha` attribute from [`Record::compute_sha`].
    pub fn with_sha(mut self, on_keys: &[&str]) -> Self {
        let sha = self.compute_sha(on_keys);
        self.values
            .insert(DEFAULT_HASH_COLUMN.to_string(), Value::Text(sha));
        self
    }

    /// Compare-key tuple for this record, or the first column that is
    /// missing or null.
    pub fn key(&self, compare_key: &CompareKey) -> Result<KeyTuple, String> {
        compare_key
            .columns()
            .iter()
            .map(|column| match self.values.get(column) {
                Some(v) if !v.is_null() => Ok(v.clone()),
                _ => Err(column.clone()),
            })
            .collect()
    }
}

/// Resolved compare-key values, in compare-key column order.
pub type KeyTuple = Vec<Value>;

// ── Dataset ─────────────────────────────────────────────────────────────────

/// Ordered collection of incoming records for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset(Vec<Record>);

impl Dataset {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn push(&mut self, record: Record) {
        self.0.push(record);
    }

    pub fn into_records(self) -> Vec<Record> {
        self.0
    }
}

impl From<Record> for Dataset {
    fn from(record: Record) -> Self {
        Self(vec![record])
    }
}

impl From<Vec<Record>> for Dataset {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

impl FromIterator<Record> for Dataset {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Dataset {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ── Compare Key ─────────────────────────────────────────────────────────────

/// Attribute name(s) identifying a record version during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareKey {
    Single(String),
    Composite(Vec<String>),
}

impl CompareKey {
    /// Canonical ordered column list.
    pub fn columns(&self) -> &[String] {
        match self {
            CompareKey::Single(column) => std::slice::from_ref(column),
            CompareKey::Composite(columns) => columns,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CompareKey::Single(column) => column.is_empty(),
            CompareKey::Composite(columns) => {
                columns.is_empty() || columns.iter().any(String::is_empty)
            }
        }
    }
}

impl Default for CompareKey {
    fn default() -> Self {
        CompareKey::Single(DEFAULT_HASH_COLUMN.to_string())
    }
}

impl fmt::Display for CompareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.columns().join(", "))
    }
}

impl From<&str> for CompareKey {
    fn from(column: &str) -> Self {
        CompareKey::Single(column.to_string())
    }
}

impl From<String> for CompareKey {
    fn from(column: String) -> Self {
        CompareKey::Single(column)
    }
}

impl From<&[&str]> for CompareKey {
    fn from(columns: &[&str]) -> Self {
        match columns {
            [single] => CompareKey::Single(single.to_string()),
            _ => CompareKey::Composite(columns.iter().map(|c| c.to_string()).collect()),
        }
    }
}

impl<const N: usize> From<[&str; N]> for CompareKey {
    fn from(columns: [&str; N]) -> Self {
        CompareKey::from(&columns[..])
    }
}

impl From<Vec<String>> for CompareKey {
    fn from(columns: Vec<String>) -> Self {
        if columns.len() == 1 {
            CompareKey::Single(columns.into_iter().next().unwrap_or_default())
        } else {
            CompareKey::Composite(columns)
        }
    }
}
