//! Raw routine invocation.
//!
//! Only a single routine call is accepted: `select fn(...)` for functions,
//! `call`/`exec`/`execute`/`begin` for procedures. Anything else, DML
//! included, is rejected before it reaches the store.

use data_collector_core::Value;

use crate::database::Database;
use crate::error::{ConfigError, DbError};
use crate::session::Session;
use crate::store::ObjectKind;

/// A validated routine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineCall {
    /// Routine name as written, possibly schema-qualified.
    pub name: String,
    pub kind: ObjectKind,
    /// Statement text with surrounding whitespace and a trailing `;` removed.
    pub statement: String,
}

const TRANSACTION_WORDS: &[&str] = &["transaction", "deferred", "immediate", "exclusive"];

/// Validate `sql` as exactly one routine invocation.
pub fn parse_routine_call(sql: &str) -> Result<RoutineCall, ConfigError> {
    let unsupported = || ConfigError::UnsupportedStatement(sql.trim().to_string());

    let statement = sql.trim();
    let statement = statement.strip_suffix(';').unwrap_or(statement).trim_end();
    if statement.is_empty() || statement.contains(';') {
        return Err(unsupported());
    }

    let (keyword, rest) = statement
        .split_once(char::is_whitespace)
        .ok_or_else(unsupported)?;
    let rest = rest.trim_start();
    let kind = match keyword.to_lowercase().as_str() {
        "select" => ObjectKind::Function,
        "call" | "exec" | "execute" | "begin" => ObjectKind::Procedure,
        _ => return Err(unsupported()),
    };

    let name_len = rest
        .find(|c: char| !is_name_char(c))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() || name.starts_with('.') || name.ends_with('.') {
        return Err(unsupported());
    }
    if keyword.eq_ignore_ascii_case("begin")
        && TRANSACTION_WORDS.contains(&name.to_lowercase().as_str())
    {
        return Err(unsupported());
    }

    let tail = rest[name_len..].trim_start();
    if kind == ObjectKind::Function {
        // Nothing may follow the argument list: no FROM, no second column.
        let close = tail
            .starts_with('(')
            .then(|| closing_paren(tail))
            .flatten()
            .ok_or_else(unsupported)?;
        if !tail[close + 1..].trim().is_empty() {
            return Err(unsupported());
        }
    }

    Ok(RoutineCall {
        name: name.to_string(),
        kind,
        statement: statement.to_string(),
    })
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$')
}

/// Byte index of the parenthesis closing the one at index 0, skipping
/// quoted string literals.
fn closing_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl Database {
    /// Run one routine call and return the rows it produced. The routine is
    /// registered with the dependency tracker after it succeeds.
    pub fn execute(&self, sql: &str, session: &Session<'_>) -> Result<Vec<Vec<Value>>, DbError> {
        let call = parse_routine_call(sql)?;
        let rows = session.store().call_routine(&call.statement)?;
        self.tracker()
            .register_routine(session, &call.name, call.kind)?;
        log::debug!("Executed {} {} ({} rows)", call.kind, call.name, rows.len());
        Ok(rows)
    }
}
