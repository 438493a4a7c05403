use chrono::NaiveDate;
use data_collector_db::*;

const EXAMPLE_DDL: &str = "
    CREATE TABLE example (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        person_id INTEGER,
        name TEXT,
        surname TEXT,
        archive DATETIME
    );";

fn setup_with(map_objects: bool) -> Database {
    let _ = env_logger::builder().is_test(true).try_init();
    let settings = DatabaseSettings {
        map_objects,
        ..DatabaseSettings::default()
    };
    let db = Database::open_memory(settings, Some("bulk-app".to_string())).unwrap();
    db.connection().execute_batch(EXAMPLE_DDL).unwrap();
    db
}

fn setup() -> Database {
    setup_with(false)
}

fn person(person_id: i64, name: &str, surname: &str) -> Record {
    Record::new("example")
        .with("person_id", person_id)
        .with("name", name)
        .with("surname", surname)
}

fn count(db: &Database, sql: &str) -> i64 {
    db.connection().query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn bulk_insert_assigns_identifiers() {
    let db = setup();
    let inserted = db
        .with_session(None, |session| {
            db.bulk_insert(vec![person(1, "Ann", "Lee"), person(2, "Bob", "Ray")], session)
        })
        .unwrap();

    let ids: Vec<i64> = inserted.iter().filter_map(Record::id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM example"), 2);
}

#[test]
fn bulk_insert_registers_touched_types() {
    let db = setup_with(true);
    db.with_session(None, |session| {
        db.bulk_insert(vec![person(1, "Ann", "Lee"), person(2, "Bob", "Ray")], session)
    })
    .unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM app_db_objects"), 1);
}

#[test]
fn delete_removes_identified_records() {
    let db = setup();
    let session = db.create_session(None).unwrap();
    let inserted = db
        .bulk_insert(vec![person(1, "Ann", "Lee"), person(2, "Bob", "Ray")], &session)
        .unwrap();
    assert_eq!(db.delete(&inserted[..1], &session).unwrap(), 1);
    session.commit().unwrap();

    assert_eq!(count(&db, "SELECT COUNT(*) FROM example"), 1);
    assert_eq!(count(&db, "SELECT person_id FROM example"), 2);
}

#[test]
fn delete_unidentified_record_is_rejected() {
    let db = setup();
    let session = db.create_session(None).unwrap();
    let err = db.delete(&[person(1, "Ann", "Lee")], &session).unwrap_err();
    assert!(matches!(err.as_config(), Some(ConfigError::Unidentified { .. })));
}

#[test]
fn delete_missing_record_is_not_found() {
    let db = setup();
    let session = db.create_session(None).unwrap();
    let mut ghost = person(1, "Ann", "Lee");
    ghost.set_id(42);
    let err = db.delete(&[ghost], &session).unwrap_err();
    assert!(matches!(err, DbError::NotFound { id: 42, .. }));
}

#[test]
fn archive_sets_marker_to_supplied_date() {
    let db = setup();
    let when = NaiveDate::from_ymd_opt(2023, 12, 31)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap();

    db.with_session(None, |session| {
        let mut inserted = db.bulk_insert(person(1, "Ann", "Lee"), session)?;
        db.archive(&mut inserted, session, "archive", Some(when))
    })
    .unwrap();

    let archive: String = db
        .connection()
        .query_row("SELECT archive FROM example", [], |row| row.get(0))
        .unwrap();
    assert_eq!(archive, "2023-12-31 23:59:59");
}

#[test]
fn archive_defaults_to_now() {
    let db = setup();
    let before = chrono::Local::now().naive_local();
    let archived = db
        .with_session(None, |session| {
            let mut inserted = db.bulk_insert(person(1, "Ann", "Lee"), session)?;
            db.archive(&mut inserted, session, "archive", None)?;
            Ok::<_, DbError>(inserted)
        })
        .unwrap();

    let when = archived[0].get("archive").and_then(Value::as_timestamp).unwrap();
    assert!(when >= before);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM example WHERE archive IS NOT NULL"), 1);
}

#[test]
fn update_insert_inserts_then_updates_changed_only() {
    let db = setup();
    let first = db
        .with_session(None, |session| {
            db.update_insert(vec![person(1, "Ann", "Lee"), person(2, "Bob", "Ray")], session, &[
                "person_id",
            ])
        })
        .unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.updated, 0);
    assert_eq!(first.number_of_records, 2);
    assert_eq!(first.inserted_records.len(), 2);

    let second = db
        .with_session(None, |session| {
            db.update_insert(vec![person(1, "Ann", "Leigh"), person(2, "Bob", "Ray")], session, &[
                "person_id",
            ])
        })
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.number_of_records, 2);

    assert_eq!(count(&db, "SELECT COUNT(*) FROM example"), 2);
    let surname: String = db
        .connection()
        .query_row("SELECT surname FROM example WHERE person_id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(surname, "Leigh");
}

#[test]
fn update_insert_matches_on_all_filter_columns() {
    let db = setup();
    db.with_session(None, |session| {
        db.update_insert(person(1, "Ann", "Lee"), session, &["person_id", "name"])
    })
    .unwrap();

    let stats = db
        .with_session(None, |session| {
            db.update_insert(person(1, "Anna", "Lee"), session, &["person_id", "name"])
        })
        .unwrap();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM example"), 2);
}

#[test]
fn update_insert_requires_filter_columns() {
    let db = setup();
    let session = db.create_session(None).unwrap();
    let err = db.update_insert(person(1, "Ann", "Lee"), &session, &[]).unwrap_err();
    assert_eq!(err.as_config(), Some(&ConfigError::NoFilterColumns));

    let err = db
        .update_insert(person(1, "Ann", "Lee"), &session, &["nickname"])
        .unwrap_err();
    assert!(matches!(
        err.as_config(),
        Some(ConfigError::MissingKeyColumn { column, .. }) if column == "nickname"
    ));
}

#[test]
fn query_rejects_unknown_filter_columns() {
    let db = setup();
    let session = db.create_session(None).unwrap();
    let err = db
        .query(&session, &[RecordType::new("example")], None, None)
        .unwrap()
        .eq("nickname", "x")
        .all()
        .unwrap_err();
    assert!(matches!(err.as_config(), Some(ConfigError::UnknownColumn { .. })));

    let err = db.query(&session, &[], None, None).unwrap_err();
    assert_eq!(err.as_config(), Some(&ConfigError::NoQueryTargets));
}

#[test]
fn query_filters_orders_and_counts() {
    let db = setup();
    let session = db.create_session(None).unwrap();
    db.bulk_insert(
        vec![person(3, "Cat", "Fox"), person(1, "Ann", "Lee"), person(2, "Bob", "Ray")],
        &session,
    )
    .unwrap();

    let query = db
        .query(&session, &[RecordType::new("example")], None, None)
        .unwrap()
        .gt("person_id", 1)
        .order_by("person_id");
    assert_eq!(query.count().unwrap(), 2);
    let names: Vec<Value> = query
        .all()
        .unwrap()
        .into_iter()
        .filter_map(|r| r.get("name").cloned())
        .collect();
    assert_eq!(names, vec![Value::from("Bob"), Value::from("Cat")]);

    let in_list = db
        .query(&session, &[RecordType::new("example")], None, None)
        .unwrap()
        .filter(Filter::all().in_list("name", ["Ann", "Cat"]))
        .count()
        .unwrap();
    assert_eq!(in_list, 2);
}

#[test]
fn update_insert_writes_only_changed_columns() {
    let db = setup();
    db.connection()
        .execute_batch(
            "CREATE TABLE asset (id INTEGER PRIMARY KEY, code TEXT, price REAL, payload BLOB);
             INSERT INTO asset (code, price, payload) VALUES ('a1', 10.0, X'FF00FE');",
        )
        .unwrap();
    let asset = |price: i64| Record::new("asset").with("code", "a1").with("price", price);

    let unchanged = db
        .with_session(None, |session| db.update_insert(asset(10), session, &["code"]))
        .unwrap();
    assert_eq!(unchanged.updated, 0);

    let changed = db
        .with_session(None, |session| db.update_insert(asset(12), session, &["code"]))
        .unwrap();
    assert_eq!(changed.updated, 1);

    let (price, payload): (f64, String) = db
        .connection()
        .query_row("SELECT price, hex(payload) FROM asset", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(price, 12.0);
    assert_eq!(payload, "FF00FE");
}

#[test]
fn archive_keeps_blob_bytes() {
    let db = setup();
    db.connection()
        .execute_batch("CREATE TABLE asset (id INTEGER PRIMARY KEY, payload BLOB, archive DATETIME);")
        .unwrap();

    db.with_session(None, |session| {
        let mut inserted = db.bulk_insert(
            Record::new("asset").with("payload", vec![0xffu8, 0x00, 0xfe]),
            session,
        )?;
        db.archive(&mut inserted, session, "archive", None)
    })
    .unwrap();

    let payload: Vec<u8> = db
        .connection()
        .query_row("SELECT payload FROM asset WHERE archive IS NOT NULL", [], |row| row.get(0))
        .unwrap();
    assert_eq!(payload, vec![0xff, 0x00, 0xfe]);
}
