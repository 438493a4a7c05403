//! Content hashing for record identity.
//!
//! The default compare key is a SHA3-256 digest of the record's attributes
//! rendered as sorted-key JSON with `", "` and `": "` separators. Text is
//! normalised before hashing (lowercased, whitespace stripped) so cosmetic
//! differences in scraped data do not create new versions. Digests match
//! the ones already stored by earlier collector runs.

use std::collections::BTreeMap;
use std::io;

use chrono::Timelike;
use serde::Serialize;
use serde_json::ser::Formatter;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use crate::value::{hex, Value};

/// Column that holds the content hash.
pub const DEFAULT_HASH_COLUMN: &str = "sha";

/// Options controlling which attributes go into a hash and how text is
/// normalised.
#[derive(Debug, Clone)]
pub struct HashOptions {
    /// Hash only these attributes, when set.
    pub on_keys: Option<Vec<String>>,
    pub exclude_keys: Vec<String>,
    /// Never hashed: the digest must not feed back into itself.
    pub hash_column: String,
    pub normalize_case: bool,
    pub no_spacing: bool,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            on_keys: None,
            exclude_keys: Vec::new(),
            hash_column: DEFAULT_HASH_COLUMN.to_string(),
            normalize_case: true,
            no_spacing: true,
        }
    }
}

impl HashOptions {
    pub fn on_keys(mut self, keys: &[&str]) -> Self {
        self.on_keys = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn exclude_keys(mut self, keys: &[&str]) -> Self {
        self.exclude_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn normalize_case(mut self, enabled: bool) -> Self {
        self.normalize_case = enabled;
        self
    }

    pub fn no_spacing(mut self, enabled: bool) -> Self {
        self.no_spacing = enabled;
        self
    }
}

/// Hex SHA3-256 digest of `values` as sorted-key JSON.
pub fn make_hash(values: &BTreeMap<String, Value>, options: &HashOptions) -> String {
    let selected: BTreeMap<&str, Value> = values
        .iter()
        .filter(|(k, _)| **k != options.hash_column)
        .filter(|(k, _)| !options.exclude_keys.contains(*k))
        .filter(|(k, _)| match &options.on_keys {
            Some(keys) => keys.contains(*k),
            None => true,
        })
        .map(|(k, v)| (k.as_str(), hash_form(v, options)))
        .collect();

    let mut hasher = Sha3_256::new();
    hasher.update(hash_payload(&selected).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The exact text [`make_hash`] digests.
pub fn hash_payload(values: &BTreeMap<&str, Value>) -> String {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    if values.serialize(&mut ser).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// Value as it enters the payload. Text is normalised; timestamps render
/// as `YYYY-MM-DD HH:MM:SS[.ffffff]`; blobs as lowercase hex.
fn hash_form(value: &Value, options: &HashOptions) -> Value {
    match value {
        Value::Text(s) => {
            let mut s = if options.normalize_case {
                s.to_lowercase()
            } else {
                s.clone()
            };
            if options.no_spacing {
                s.retain(|c| !c.is_whitespace());
            }
            Value::Text(s)
        }
        Value::Timestamp(ts) => {
            let mut text = ts.format("%Y-%m-%d %H:%M:%S").to_string();
            let micros = ts.nanosecond() / 1_000;
            if micros != 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::Text(text)
        }
        Value::Blob(bytes) => Value::Text(hex(bytes)),
        other => other.clone(),
    }
}

/// JSON formatter with a space after every `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Stable application identifier: SHA-256 of `group|parent|name`.
///
/// The collector itself (`data_collector` as both parent and name) always
/// lives in the `data_collector` group.
pub fn app_id(group: &str, parent: &str, name: &str) -> String {
    let group = if parent == "data_collector" && name == "data_collector" {
        "data_collector"
    } else {
        group
    };
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", group, parent, name).as_bytes());
    format!("{:x}", hasher.finalize())
}
