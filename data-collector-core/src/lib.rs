//! Record model for the data-collector reconciliation core.
//!
//! This crate defines attribute values, records, record types, and compare
//! keys without any database dependencies, plus the content-hash helpers
//! used to populate the `sha` identity column. Persistence lives in
//! `data-collector-db`.

pub mod hashing;
pub mod record;
pub mod value;

pub use hashing::{app_id, hash_payload, make_hash, HashOptions, DEFAULT_HASH_COLUMN};
pub use record::{CompareKey, Dataset, KeyTuple, Record, RecordType, ID_COLUMN};
pub use value::{format_timestamp, hex, parse_timestamp, Value, TIMESTAMP_FORMAT};
