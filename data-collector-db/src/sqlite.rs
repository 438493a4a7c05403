//! SQLite adapter for [`RecordStore`].
//!
//! Implemented directly on [`rusqlite::Connection`], so a session's
//! transaction (which derefs to a connection) is a store as well.

use data_collector_core::{format_timestamp, parse_timestamp, Record, RecordType, Value, ID_COLUMN};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{ConfigError, DbError};
use crate::store::{Affinity, Column, DependencyRow, Filter, ObjectKind, Op, RecordStore};

/// Schema used when a record type does not name one.
pub const DEFAULT_SCHEMA: &str = "main";

impl RecordStore for Connection {
    fn select(&self, record_type: &RecordType, filter: &Filter) -> Result<Vec<Record>, DbError> {
        let info = table_info(self, record_type)?;
        validate_columns(record_type, &info, filter.columns())?;

        let mut args = Vec::new();
        let sql = format!(
            "SELECT * FROM {}{}",
            qualified(record_type),
            render_filter(filter, &mut args, true)
        );

        let mut stmt = self.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let temporal: Vec<bool> = names
            .iter()
            .map(|n| info.iter().any(|c| &c.name == n && c.temporal))
            .collect();

        let rows = stmt.query_map(params_from_iter(args.iter().map(|v| SqlValue(v))), |row| {
            let mut record = Record::new(record_type.clone());
            for (i, name) in names.iter().enumerate() {
                record.set(name.clone(), value_from_sql(row.get_ref(i)?, temporal[i]));
            }
            Ok(record)
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn count(&self, record_type: &RecordType, filter: &Filter) -> Result<usize, DbError> {
        let info = table_info(self, record_type)?;
        validate_columns(record_type, &info, filter.columns())?;

        let mut args = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            qualified(record_type),
            render_filter(filter, &mut args, false)
        );
        let count: i64 = self.query_row(
            &sql,
            params_from_iter(args.iter().map(|v| SqlValue(v))),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert(&self, record: &Record) -> Result<i64, DbError> {
        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(id) = record.id() {
            columns.push(ID_COLUMN);
            values.push(Value::Integer(id));
        }
        for (column, value) in record.values() {
            columns.push(column);
            values.push(value.clone());
        }

        let table = qualified(record.record_type());
        if columns.is_empty() {
            self.execute(&format!("INSERT INTO {} DEFAULT VALUES", table), [])?;
        } else {
            let column_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>();
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                column_list.join(", "),
                placeholders.join(", ")
            );
            self.execute(&sql, params_from_iter(values.iter().map(SqlValue)))?;
        }
        Ok(self.last_insert_rowid())
    }

    fn update(&self, record: &Record) -> Result<(), DbError> {
        let id = require_id(record)?;
        if record.values().is_empty() {
            return Ok(());
        }

        let assignments = record
            .values()
            .keys()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect::<Vec<_>>();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            qualified(record.record_type()),
            assignments.join(", "),
            quote_ident(ID_COLUMN),
            assignments.len() + 1
        );

        let id_value = Value::Integer(id);
        let args = record.values().values().chain(std::iter::once(&id_value));
        let changed = self.execute(&sql, params_from_iter(args.map(SqlValue)))?;
        if changed == 0 {
            return Err(not_found(record, id));
        }
        Ok(())
    }

    fn update_columns(&self, record: &Record, columns: &[&str]) -> Result<(), DbError> {
        let id = require_id(record)?;
        if columns.is_empty() {
            return Ok(());
        }

        let values: Vec<Value> = columns
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect::<Vec<_>>();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            qualified(record.record_type()),
            assignments.join(", "),
            quote_ident(ID_COLUMN),
            columns.len() + 1
        );

        let id_value = Value::Integer(id);
        let args = values.iter().chain(std::iter::once(&id_value));
        let changed = self.execute(&sql, params_from_iter(args.map(SqlValue)))?;
        if changed == 0 {
            return Err(not_found(record, id));
        }
        Ok(())
    }

    fn delete(&self, record: &Record) -> Result<(), DbError> {
        let id = require_id(record)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            qualified(record.record_type()),
            quote_ident(ID_COLUMN)
        );
        let changed = self.execute(&sql, params![id])?;
        if changed == 0 {
            return Err(not_found(record, id));
        }
        Ok(())
    }

    fn columns(&self, record_type: &RecordType) -> Result<Vec<Column>, DbError> {
        table_info(self, record_type)
    }

    fn object_kind(&self, record_type: &RecordType) -> Result<ObjectKind, DbError> {
        let sql = format!(
            "SELECT type FROM {}.sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
            quote_ident(schema_name(record_type))
        );
        let kind: Option<String> = self
            .query_row(&sql, params![record_type.name], |row| row.get(0))
            .optional()?;
        Ok(kind
            .map(|k| ObjectKind::from_str_loose(&k))
            .unwrap_or(ObjectKind::Unknown))
    }

    fn write_dependency(&self, row: &DependencyRow) -> Result<(), DbError> {
        self.execute(
            "INSERT INTO app_db_objects (app_id, server_type, server_name, database_name,
                 database_schema, object_name, object_type, last_use_date, sha)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(app_id, sha) DO UPDATE SET
                 last_use_date = excluded.last_use_date",
            params![
                row.app_id,
                row.server_type,
                row.server_name,
                row.database_name,
                row.database_schema,
                row.object_name,
                row.object_type.as_str(),
                format_timestamp(&row.last_use_date),
                row.sha,
            ],
        )?;
        Ok(())
    }

    fn call_routine(&self, sql: &str) -> Result<Vec<Vec<Value>>, DbError> {
        let mut stmt = self.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(|v| value_from_sql(v, false)))
                .collect::<Result<Vec<_>, _>>()
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

// ── Value Conversion ────────────────────────────────────────────────────────

struct SqlValue<'a>(&'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Owned;
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Owned::Null),
            Value::Integer(i) => ToSqlOutput::Owned(Owned::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(Owned::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(Owned::Text(format_timestamp(ts))),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Convert a column value. Text in date/time columns becomes a timestamp
/// when it parses as one.
fn value_from_sql(value: ValueRef<'_>, temporal: bool) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if temporal {
                if let Some(ts) = parse_timestamp(&text) {
                    return Value::Timestamp(ts);
                }
            }
            Value::Text(text)
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn table_info(conn: &Connection, record_type: &RecordType) -> Result<Vec<Column>, DbError> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1, ?2)")?;
    let rows = stmt.query_map(params![record_type.name, schema_name(record_type)], |row| {
        let decl = row.get::<_, Option<String>>(1)?.unwrap_or_default().to_uppercase();
        Ok(Column {
            name: row.get(0)?,
            affinity: affinity_of(&decl),
            temporal: decl.contains("DATE") || decl.contains("TIME"),
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Column affinity from an upper-cased declared type, by SQLite's rules.
fn affinity_of(decl: &str) -> Affinity {
    if decl.contains("INT") {
        Affinity::Integer
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        Affinity::Text
    } else if decl.is_empty() || decl.contains("BLOB") {
        Affinity::Blob
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

/// Reject filter columns the table does not have. Unknown tables are left
/// for the store to report.
fn validate_columns<'a>(
    record_type: &RecordType,
    info: &[Column],
    columns: impl Iterator<Item = &'a str>,
) -> Result<(), DbError> {
    if info.is_empty() {
        return Ok(());
    }
    for column in columns {
        if !info.iter().any(|c| c.name == column) {
            return Err(ConfigError::UnknownColumn {
                record_type: record_type.to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Render `WHERE`/`ORDER BY` clauses, pushing bound values onto `args`.
fn render_filter<'a>(filter: &'a Filter, args: &mut Vec<&'a Value>, with_order: bool) -> String {
    let mut clauses = Vec::new();
    for condition in filter.conditions() {
        let column = quote_ident(&condition.column);
        let clause = match &condition.op {
            Op::Eq(v) => bind(args, &column, "=", v),
            Op::Ne(v) => bind(args, &column, "<>", v),
            Op::Lt(v) => bind(args, &column, "<", v),
            Op::Le(v) => bind(args, &column, "<=", v),
            Op::Gt(v) => bind(args, &column, ">", v),
            Op::Ge(v) => bind(args, &column, ">=", v),
            Op::IsNull => format!("{} IS NULL", column),
            Op::IsNotNull => format!("{} IS NOT NULL", column),
            Op::In(values) if values.is_empty() => "0 = 1".to_string(),
            Op::In(values) => {
                let mut placeholders = Vec::with_capacity(values.len());
                for v in values {
                    args.push(v);
                    placeholders.push(format!("?{}", args.len()));
                }
                format!("{} IN ({})", column, placeholders.join(", "))
            }
        };
        clauses.push(clause);
    }

    let mut sql = String::new();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if with_order && !filter.ordering().is_empty() {
        let order = filter
            .ordering()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    sql
}

fn bind<'a>(args: &mut Vec<&'a Value>, column: &str, op: &str, value: &'a Value) -> String {
    args.push(value);
    format!("{} {} ?{}", column, op, args.len())
}

fn require_id(record: &Record) -> Result<i64, DbError> {
    record.id().ok_or_else(|| {
        ConfigError::Unidentified {
            record_type: record.record_type().to_string(),
        }
        .into()
    })
}

fn not_found(record: &Record, id: i64) -> DbError {
    DbError::NotFound {
        record_type: record.record_type().to_string(),
        id,
    }
}

fn schema_name(record_type: &RecordType) -> &str {
    record_type.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
}

fn qualified(record_type: &RecordType) -> String {
    match &record_type.schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&record_type.name)),
        None => quote_ident(&record_type.name),
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
