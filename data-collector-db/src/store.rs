//! The store interface the reconciliation core runs against.
//!
//! [`RecordStore`] is the only seam between the engine and a concrete
//! database client: a filtered read, identified writes, a catalogue lookup,
//! the dependency metadata write, and routine calls. The SQLite adapter in
//! [`crate::sqlite`] is the production implementation.

use std::fmt;

use chrono::NaiveDateTime;
use data_collector_core::{format_timestamp, parse_timestamp, Record, RecordType, Value};

use crate::error::DbError;

/// Read/write access to typed records inside one transaction.
pub trait RecordStore {
    /// All records of `record_type` matching `filter`.
    fn select(&self, record_type: &RecordType, filter: &Filter) -> Result<Vec<Record>, DbError>;

    /// Number of records of `record_type` matching `filter`.
    fn count(&self, record_type: &RecordType, filter: &Filter) -> Result<usize, DbError>;

    /// Insert a record and return its store-assigned identifier.
    fn insert(&self, record: &Record) -> Result<i64, DbError>;

    /// Overwrite every attribute of an identified record.
    fn update(&self, record: &Record) -> Result<(), DbError>;

    /// Write only `columns` of an identified record, taking each value from
    /// the record. Other columns of the row are left as stored.
    fn update_columns(&self, record: &Record, columns: &[&str]) -> Result<(), DbError>;

    /// Remove an identified record.
    fn delete(&self, record: &Record) -> Result<(), DbError>;

    /// Columns of `record_type`, in declaration order. Empty when the
    /// object does not exist.
    fn columns(&self, record_type: &RecordType) -> Result<Vec<Column>, DbError>;

    /// Whether `record_type` names a table, a view, or nothing known.
    fn object_kind(&self, record_type: &RecordType) -> Result<ObjectKind, DbError>;

    /// Persist one dependency metadata row, refreshing it if already present.
    fn write_dependency(&self, row: &DependencyRow) -> Result<(), DbError>;

    /// Run a routine invocation and return whatever rows it produced.
    fn call_routine(&self, sql: &str) -> Result<Vec<Vec<Value>>, DbError>;
}

// ── Columns ─────────────────────────────────────────────────────────────────

/// How a column converts values on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Real,
    Numeric,
    Text,
    /// No conversion.
    Blob,
}

/// One column of a table or view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub affinity: Affinity,
    /// Declared as a date or time; text that parses as a timestamp reads
    /// back as [`Value::Timestamp`].
    pub temporal: bool,
}

impl Column {
    /// `value` as it reads back after a write to this column. Comparing
    /// stored forms makes incoming values equal to their persisted copies.
    pub fn stored(&self, value: &Value) -> Value {
        let written = match value {
            Value::Timestamp(ts) => Value::Text(format_timestamp(ts)),
            other => other.clone(),
        };
        let converted = match (self.affinity, written) {
            (Affinity::Text, Value::Integer(i)) => Value::Text(i.to_string()),
            (Affinity::Text, Value::Real(r)) => Value::Text(format!("{:?}", r)),
            (Affinity::Real, Value::Integer(i)) => Value::Real(i as f64),
            (Affinity::Real, Value::Text(t)) => match numeric_text(&t) {
                Some(Value::Integer(i)) => Value::Real(i as f64),
                Some(number) => number,
                None => Value::Text(t),
            },
            (Affinity::Integer | Affinity::Numeric, Value::Real(r)) => integral(r),
            (Affinity::Integer | Affinity::Numeric, Value::Text(t)) => match numeric_text(&t) {
                Some(Value::Real(r)) => integral(r),
                Some(number) => number,
                None => Value::Text(t),
            },
            (_, other) => other,
        };
        match converted {
            Value::Text(t) if self.temporal => match parse_timestamp(&t) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Text(t),
            },
            other => other,
        }
    }
}

/// A real with no fractional part that fits an integer is stored as one.
fn integral(r: f64) -> Value {
    if r.fract() == 0.0 && r >= -9.2e18 && r <= 9.2e18 {
        Value::Integer(r as i64)
    } else {
        Value::Real(r)
    }
}

/// Text that is a well-formed integer or real literal.
fn numeric_text(text: &str) -> Option<Value> {
    let t = text.trim();
    if t.is_empty()
        || !t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    t.parse::<f64>().ok().map(Value::Real)
}

// ── Filters ─────────────────────────────────────────────────────────────────

/// Comparison applied to one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    IsNull,
    IsNotNull,
    In(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Op,
}

/// Conjunction of column conditions plus an optional ordering.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    order_by: Vec<String>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn condition(mut self, column: impl Into<String>, op: Op) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
        });
        self
    }

    /// Equality. A null value is rewritten to `IS NULL`.
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            self.condition(column, Op::IsNull)
        } else {
            self.condition(column, Op::Eq(value))
        }
    }

    /// Inequality. A null value is rewritten to `IS NOT NULL`.
    pub fn ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            self.condition(column, Op::IsNotNull)
        } else {
            self.condition(column, Op::Ne(value))
        }
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(column, Op::Lt(value.into()))
    }

    pub fn le(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(column, Op::Le(value.into()))
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(column, Op::Gt(value.into()))
    }

    pub fn ge(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(column, Op::Ge(value.into()))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.condition(column, Op::IsNull)
    }

    pub fn is_not_null(self, column: impl Into<String>) -> Self {
        self.condition(column, Op::IsNotNull)
    }

    pub fn in_list<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.condition(column, Op::In(values))
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    /// Both filters' conditions, and both orderings.
    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self.order_by.extend(other.order_by);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[String] {
        &self.order_by
    }

    /// Every column the filter mentions.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|c| c.column.as_str())
            .chain(self.order_by.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.order_by.is_empty()
    }
}

// ── Dependency Metadata ─────────────────────────────────────────────────────

/// What kind of database object a dependency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    View,
    Function,
    Procedure,
    Unknown,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Function => "function",
            ObjectKind::Procedure => "procedure",
            ObjectKind::Unknown => "unknown",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "table" => ObjectKind::Table,
            "view" => ObjectKind::View,
            "function" => ObjectKind::Function,
            "procedure" => ObjectKind::Procedure,
            _ => ObjectKind::Unknown,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `app_db_objects` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRow {
    pub app_id: String,
    pub server_type: String,
    pub server_name: Option<String>,
    pub database_name: String,
    pub database_schema: String,
    pub object_name: String,
    pub object_type: ObjectKind,
    /// Content hash of the identifying fields above.
    pub sha: String,
    pub last_use_date: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn column(affinity: Affinity, temporal: bool) -> Column {
        Column {
            name: "c".to_string(),
            affinity,
            temporal,
        }
    }

    #[test]
    fn real_columns_store_integers_as_reals() {
        let price = column(Affinity::Real, false);
        assert_eq!(price.stored(&Value::Integer(10)), Value::Real(10.0));
        assert_eq!(price.stored(&Value::from("2.5")), Value::Real(2.5));
        assert_eq!(price.stored(&Value::Real(10.0)), Value::Real(10.0));
    }

    #[test]
    fn numeric_columns_store_whole_reals_as_integers() {
        let qty = column(Affinity::Numeric, false);
        assert_eq!(qty.stored(&Value::Real(3.0)), Value::Integer(3));
        assert_eq!(qty.stored(&Value::Real(3.5)), Value::Real(3.5));
        assert_eq!(qty.stored(&Value::from("42")), Value::Integer(42));
        assert_eq!(qty.stored(&Value::from("n/a")), Value::from("n/a"));
    }

    #[test]
    fn timestamps_read_back_by_column_kind() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let text = column(Affinity::Text, false);
        assert_eq!(text.stored(&Value::Timestamp(ts)), Value::from("2024-01-15 12:00:00"));

        let date = column(Affinity::Numeric, true);
        assert_eq!(date.stored(&Value::Timestamp(ts)), Value::Timestamp(ts));
        assert_eq!(date.stored(&Value::from("2024-01-15 12:00:00")), Value::Timestamp(ts));
    }

    #[test]
    fn text_and_blob_columns() {
        let text = column(Affinity::Text, false);
        assert_eq!(text.stored(&Value::Integer(7)), Value::from("7"));
        assert_eq!(text.stored(&Value::Real(1.5)), Value::from("1.5"));

        let raw = column(Affinity::Blob, false);
        assert_eq!(raw.stored(&Value::Integer(7)), Value::Integer(7));
        assert_eq!(raw.stored(&Value::from(vec![1u8, 2])), Value::Blob(vec![1, 2]));
    }

    #[test]
    fn stored_form_is_stable() {
        let price = column(Affinity::Real, false);
        let once = price.stored(&Value::Integer(10));
        assert_eq!(price.stored(&once), once);
    }
}
