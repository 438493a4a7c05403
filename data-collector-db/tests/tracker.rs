use data_collector_db::*;

const EXAMPLE_DDL: &str = "
    CREATE TABLE example (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        sha TEXT,
        archive DATETIME
    );
    CREATE TABLE other (id INTEGER PRIMARY KEY, label TEXT);
    CREATE VIEW example_view AS SELECT id, name FROM example WHERE archive IS NULL;";

fn setup(map_objects: bool, app_id: Option<&str>) -> Database {
    let _ = env_logger::builder().is_test(true).try_init();
    let settings = DatabaseSettings {
        map_objects,
        server_name: Some("localhost".to_string()),
        ..DatabaseSettings::default()
    };
    let db = Database::open_memory(settings, app_id.map(str::to_string)).unwrap();
    db.connection().execute_batch(EXAMPLE_DDL).unwrap();
    db
}

fn example() -> RecordType {
    RecordType::new("example")
}

fn dependency_rows(db: &Database) -> Vec<(String, String, String)> {
    let mut stmt = db
        .connection()
        .prepare(
            "SELECT object_name, object_type, database_schema FROM app_db_objects
             ORDER BY object_name",
        )
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn repeated_queries_write_one_row() {
    let db = setup(true, Some("app-1"));
    db.with_session(None, |session| {
        for _ in 0..3 {
            db.query(session, &[example()], None, None)?.all()?;
        }
        Ok::<_, DbError>(())
    })
    .unwrap();

    assert_eq!(
        dependency_rows(&db),
        vec![("example".to_string(), "table".to_string(), "main".to_string())]
    );

    let (app_id, server_type, server_name, database_name): (String, String, String, String) = db
        .connection()
        .query_row(
            "SELECT app_id, server_type, server_name, database_name FROM app_db_objects",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(app_id, "app-1");
    assert_eq!(server_type, SERVER_TYPE);
    assert_eq!(server_name, "localhost");
    assert_eq!(database_name, "main");
}

#[test]
fn merge_registers_type_once() {
    let db = setup(true, Some("app-1"));
    let records = vec![
        Record::new("example").with("name", "a").with_sha(&[]),
        Record::new("example").with("name", "b").with_sha(&[]),
    ];
    db.with_session(None, |session| {
        db.merge(records, session, &MergeOptions::default())
    })
    .unwrap();

    assert_eq!(dependency_rows(&db).len(), 1);
    assert!(db.tracker().registered().contains("main.main.example"));
}

#[test]
fn tracking_off_without_map_objects() {
    let db = setup(false, Some("app-1"));
    db.with_session(None, |session| db.query(session, &[example()], None, None)?.count())
        .unwrap();
    assert!(dependency_rows(&db).is_empty());
    assert!(!db.tracker().is_active());
}

#[test]
fn tracking_off_without_app_id() {
    let db = setup(true, None);
    db.with_session(None, |session| db.query(session, &[example()], None, None)?.count())
        .unwrap();
    assert!(dependency_rows(&db).is_empty());
}

#[test]
fn query_can_opt_out_of_tracking() {
    let db = setup(true, Some("app-1"));
    db.with_session(None, |session| {
        db.query(session, &[example()], Some(false), None)?.count()
    })
    .unwrap();
    assert!(dependency_rows(&db).is_empty());
}

#[test]
fn caller_registry_defers_writes_until_flush() {
    let db = setup(true, Some("app-1"));
    let session = db.create_session(None).unwrap();
    let mut seen = DependencyRegistry::new();

    db.query(&session, &[example(), RecordType::new("other")], None, Some(&mut seen))
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(seen.len(), 2);
    assert!(dependency_rows(&db).is_empty());

    assert_eq!(db.tracker().flush(&session, &seen).unwrap(), 2);
    assert_eq!(db.tracker().flush(&session, &seen).unwrap(), 0);
    session.commit().unwrap();

    let names: Vec<String> = dependency_rows(&db).into_iter().map(|(name, ..)| name).collect();
    assert_eq!(names, vec!["example", "other"]);
}

#[test]
fn views_are_classified() {
    let db = setup(true, Some("app-1"));
    db.with_session(None, |session| {
        db.query(session, &[RecordType::new("example_view")], None, None)?
            .all()
    })
    .unwrap();
    assert_eq!(
        dependency_rows(&db),
        vec![("example_view".to_string(), "view".to_string(), "main".to_string())]
    );
}

#[test]
fn sql_objects_are_classified_by_catalogue() {
    let db = setup(true, Some("app-1"));
    let session = db.create_session(None).unwrap();
    let written = db
        .tracker()
        .register_sql_objects(&session, &["main.example_view", "warehouse.main.no_such_thing"])
        .unwrap();
    assert_eq!(written, 2);
    session.commit().unwrap();

    let rows = dependency_rows(&db);
    assert_eq!(rows[0], ("example_view".to_string(), "view".to_string(), "main".to_string()));
    assert_eq!(rows[1], ("no_such_thing".to_string(), "unknown".to_string(), "main".to_string()));

    let database: String = db
        .connection()
        .query_row(
            "SELECT database_name FROM app_db_objects WHERE object_name = 'no_such_thing'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(database, "warehouse");
}

#[test]
fn begin_run_allows_registration_again() {
    let db = setup(true, Some("app-1"));
    let run = || {
        db.with_session(None, |session| db.query(session, &[example()], None, None)?.count())
            .unwrap();
    };

    run();
    assert_eq!(db.tracker().registered().len(), 1);
    let first: String = db
        .connection()
        .query_row("SELECT last_use_date FROM app_db_objects", [], |row| row.get(0))
        .unwrap();

    db.begin_run();
    assert!(db.tracker().registered().is_empty());
    std::thread::sleep(std::time::Duration::from_millis(5));
    run();

    // Upserted on (app_id, sha): still one row, with a fresher use date.
    assert_eq!(dependency_rows(&db).len(), 1);
    let second: String = db
        .connection()
        .query_row("SELECT last_use_date FROM app_db_objects", [], |row| row.get(0))
        .unwrap();
    assert!(second > first);
}

#[test]
fn registrations_are_per_application() {
    let first = setup(true, Some("app-1"));
    let session = first.create_session(None).unwrap();
    first.tracker().register_models(&session, &[example()]).unwrap();
    session.commit().unwrap();

    let app: String = first
        .connection()
        .query_row("SELECT app_id FROM app_db_objects", [], |row| row.get(0))
        .unwrap();
    assert_eq!(app, "app-1");
    assert_eq!(first.app_id(), Some("app-1"));
}

#[test]
fn object_keys_are_fully_qualified() {
    let object = DbObject {
        database_name: "main".to_string(),
        schema: "main".to_string(),
        name: "example".to_string(),
        kind: ObjectKind::Table,
    };
    assert_eq!(object.key(), "main.main.example");

    let mut registry = DependencyRegistry::new();
    assert!(registry.insert(object.clone()));
    assert!(!registry.insert(object));
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["main.main.example"]);
}

#[test]
fn rolled_back_registration_is_written_by_next_session() {
    let db = setup(true, Some("app-1"));
    let records = || vec![Record::new("example").with("name", "a").with_sha(&[])];

    let failed: Result<(), DbError> = db.with_session(Some("aborted"), |session| {
        db.merge(records(), session, &MergeOptions::default())?;
        Err(DbError::NotFound {
            record_type: "example".to_string(),
            id: 0,
        })
    });
    assert!(failed.is_err());
    assert!(db.tracker().registered().is_empty());
    assert!(dependency_rows(&db).is_empty());

    db.with_session(Some("retried"), |session| {
        db.merge(records(), session, &MergeOptions::default())
    })
    .unwrap();
    assert_eq!(
        dependency_rows(&db),
        vec![("example".to_string(), "table".to_string(), "main".to_string())]
    );
    assert!(db.tracker().registered().contains("main.main.example"));
}

#[test]
fn dropped_session_discards_staged_registrations() {
    let db = setup(true, Some("app-1"));
    {
        let session = db.create_session(None).unwrap();
        db.tracker().register_models(&session, &[example()]).unwrap();
    }
    assert!(db.tracker().registered().is_empty());

    let session = db.create_session(None).unwrap();
    assert_eq!(db.tracker().register_models(&session, &[example()]).unwrap(), 1);
    session.commit().unwrap();
    assert_eq!(dependency_rows(&db).len(), 1);
}
