use std::collections::BTreeMap;

use chrono::NaiveDate;
use data_collector_core::*;

fn person(name: &str, surname: &str) -> BTreeMap<String, Value> {
    let mut values = BTreeMap::new();
    values.insert("company_id".to_string(), Value::Integer(1));
    values.insert("name".to_string(), Value::from(name));
    values.insert("surname".to_string(), Value::from(surname));
    values
}

#[test]
fn hash_is_hex_sha3_256() {
    let hash = make_hash(&person("Ana", "Horvat"), &HashOptions::default());
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn hash_matches_stored_collector_digest() {
    assert_eq!(
        make_hash(&person("Ana", "Horvat"), &HashOptions::default()),
        "cfd76fcb7e155563748ccd4bba42cb6e0b6205864d0c47d0811adddaba668f89"
    );
}

#[test]
fn payload_uses_spaced_separators_and_raw_unicode() {
    let seen = NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let mut values = BTreeMap::new();
    values.insert("name".to_string(), Value::from("Željko"));
    values.insert("price".to_string(), Value::Real(10.5));
    values.insert("seen".to_string(), Value::Timestamp(seen));
    values.insert("note".to_string(), Value::Null);

    let mut selected = BTreeMap::new();
    selected.insert("a", Value::Integer(1));
    selected.insert("b", Value::from("x"));
    assert_eq!(hash_payload(&selected), r#"{"a": 1, "b": "x"}"#);

    assert_eq!(
        make_hash(&values, &HashOptions::default()),
        "f35205ccc12e5214ace83574f018d012ae3c81e0f365a1b19d53e56045d1b7ef"
    );
}

#[test]
fn hash_ignores_case_and_whitespace_by_default() {
    let a = make_hash(&person("Ana", "Horvat"), &HashOptions::default());
    let b = make_hash(&person(" ANA ", "hor vat"), &HashOptions::default());
    assert_eq!(a, b);
}

#[test]
fn hash_respects_disabled_normalisation() {
    let options = HashOptions::default().normalize_case(false).no_spacing(false);
    let a = make_hash(&person("Ana", "Horvat"), &options);
    let b = make_hash(&person("ana", "Horvat"), &options);
    assert_ne!(a, b);
}

#[test]
fn hash_never_includes_the_hash_column() {
    let mut with_sha = person("Ana", "Horvat");
    with_sha.insert("sha".to_string(), Value::from("stale"));
    assert_eq!(
        make_hash(&with_sha, &HashOptions::default()),
        make_hash(&person("Ana", "Horvat"), &HashOptions::default())
    );
}

#[test]
fn hash_on_keys_and_exclude_keys() {
    let only_name = HashOptions::default().on_keys(&["name"]);
    assert_eq!(
        make_hash(&person("Ana", "Horvat"), &only_name),
        make_hash(&person("Ana", "Kovac"), &only_name)
    );

    let no_surname = HashOptions::default().exclude_keys(&["surname"]);
    assert_eq!(
        make_hash(&person("Ana", "Horvat"), &no_surname),
        make_hash(&person("Ana", "Kovac"), &no_surname)
    );
    assert_ne!(
        make_hash(&person("Ana", "Horvat"), &HashOptions::default()),
        make_hash(&person("Ana", "Kovac"), &HashOptions::default())
    );
}

#[test]
fn app_id_is_stable_and_special_cases_collector() {
    assert_eq!(app_id("g", "p", "n"), app_id("g", "p", "n"));
    assert_ne!(app_id("g", "p", "n"), app_id("g", "p", "m"));
    assert_eq!(
        app_id("anything", "data_collector", "data_collector"),
        app_id("data_collector", "data_collector", "data_collector")
    );
}
