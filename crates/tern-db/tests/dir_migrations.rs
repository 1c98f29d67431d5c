use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tern_common::{Error, VersionRange};
use tern_config::TernConfig;
use tern_db::{
    DirSource, Migration, MigrationAction, MigrationSource, Migrator, StepOutcome,
    VersionScheme, create_migration, open_database,
};

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).expect("write migration file");
}

fn config_for(dir: &Path) -> TernConfig {
    TernConfig {
        database: dir.join("app.db"),
        migrations_dir: dir.join("migrations"),
        ..Default::default()
    }
}

/// Lay out three migrations that build on each other.
fn seed_migrations(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    write(
        dir,
        "1_create_users.sql",
        "-- tern:up\nCREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\n-- tern:down\nDROP TABLE users;\n",
    );
    write(
        dir,
        "2_add_email.sql",
        "-- tern:up\nALTER TABLE users ADD COLUMN email TEXT;\n",
    );
    write(
        dir,
        "3_create_posts.sql",
        "-- tern:up\nCREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id));\n",
    );
    write(dir, "README.md", "not a migration");
}

fn columns(conn: &rusqlite::Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn dir_source_collects_sorted_sql_files() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    seed_migrations(&dir);

    let set = DirSource::new(&dir).collect(VersionRange::all()).unwrap();

    assert_eq!(set.versions(), vec![1, 2, 3]);
    let first = set.first().unwrap();
    assert_eq!(first.name, "create_users");
    assert!(matches!(
        first.down,
        Some(MigrationAction::Sql(ref sql)) if sql == "DROP TABLE users;"
    ));
    assert!(set.get(2).unwrap().down.is_none());
}

#[test]
fn dir_source_respects_range() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    seed_migrations(&dir);

    let set = DirSource::new(&dir)
        .collect(VersionRange::between(2, 3))
        .unwrap();
    assert_eq!(set.versions(), vec![2, 3]);
}

#[test]
fn duplicate_versions_in_directory_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, "4_first.sql", "-- tern:up\nSELECT 1;\n");
    write(dir, "4_second.sql", "-- tern:up\nSELECT 2;\n");

    let err = DirSource::new(dir).collect(VersionRange::all()).unwrap_err();

    match err {
        Error::DuplicateVersion {
            version,
            first,
            second,
        } => {
            assert_eq!(version, 4);
            let mut labels = [first, second];
            labels.sort();
            assert!(labels[0].ends_with("4_first.sql"));
            assert!(labels[1].ends_with("4_second.sql"));
        }
        other => panic!("expected DuplicateVersion, got {other:?}"),
    }
}

#[test]
fn duplicates_outside_the_range_still_fail() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, "1_ok.sql", "-- tern:up\n");
    write(dir, "9_a.sql", "-- tern:up\n");
    write(dir, "9_b.sql", "-- tern:up\n");

    let result = DirSource::new(dir).collect(VersionRange::up_to(1));
    assert!(matches!(result, Err(Error::DuplicateVersion { version: 9, .. })));
}

#[test]
fn registered_migration_conflicting_with_file_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, "2_file.sql", "-- tern:up\n");

    let source = DirSource::new(dir).register(2, "code", |_| Ok(()));
    let result = source.collect(VersionRange::all());
    assert!(matches!(result, Err(Error::DuplicateVersion { version: 2, .. })));
}

#[test]
fn upper_case_extension_is_discovered() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, "1_a.SQL", "-- tern:up\nCREATE TABLE a (id INTEGER);\n");
    write(dir, "2_b.Sql", "-- tern:up\nCREATE TABLE b (id INTEGER);\n");

    let set = DirSource::new(dir).collect(VersionRange::all()).unwrap();
    assert_eq!(set.versions(), vec![1, 2]);
}

#[test]
fn registered_migration_keeps_its_down_action() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, "1_file.sql", "-- tern:up\nCREATE TABLE a (id INTEGER);\n");

    let code = Migration::code(2, "seed", |conn| {
        conn.execute("INSERT INTO a (id) VALUES (1)", []).map(|_| ())
    })
    .with_down(MigrationAction::Sql("DELETE FROM a;".into()));
    let source = DirSource::new(dir).register_migration(code);

    let set = source.collect(VersionRange::all()).unwrap();
    assert_eq!(set.versions(), vec![1, 2]);
    assert!(matches!(
        set.get(2).and_then(|m| m.down.as_ref()),
        Some(MigrationAction::Sql(sql)) if sql == "DELETE FROM a;"
    ));
}

#[test]
fn malformed_files_are_parse_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    write(dir, "create_users.sql", "-- tern:up\n");
    let err = DirSource::new(dir).collect(VersionRange::all()).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    fs::remove_file(dir.join("create_users.sql")).unwrap();

    write(dir, "1_no_marker.sql", "CREATE TABLE t (id INTEGER);\n");
    let err = DirSource::new(dir).collect(VersionRange::all()).unwrap_err();
    assert!(matches!(err, Error::Parse { ref reason, .. } if reason.contains("tern:up")));
}

#[test]
fn missing_directory_is_a_read_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = DirSource::new(tmp.path().join("absent"))
        .collect(VersionRange::all())
        .unwrap_err();
    assert!(matches!(err, Error::SourceRead { .. }));
    assert!(err.is_source_error());
}

#[test]
fn up_against_a_file_database_is_resumable() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_for(tmp.path());
    seed_migrations(&config.migrations_dir);
    let migrator = Migrator::from_config(&config).unwrap();

    {
        let mut conn = open_database(&config.database, Duration::from_millis(500)).unwrap();
        let report = migrator.up_to(&mut conn, 2).unwrap();
        assert_eq!(report.applied, vec![1, 2]);
    }

    // Reopen to prove the history was persisted, not held in memory.
    let mut conn = open_database(&config.database, Duration::from_millis(500)).unwrap();
    assert_eq!(migrator.version(&conn).unwrap(), Some(2));
    assert_eq!(columns(&conn, "users"), vec!["id", "name", "email"]);

    let report = migrator.up(&mut conn).unwrap();
    assert_eq!(report.applied, vec![3]);
    assert_eq!(report.skipped, 2);

    let again = migrator.up(&mut conn).unwrap();
    assert!(again.is_noop());
    assert_eq!(again.current, Some(3));
}

#[test]
fn up_by_one_walks_the_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_for(tmp.path());
    seed_migrations(&config.migrations_dir);
    let migrator = Migrator::from_config(&config).unwrap();
    let mut conn = open_database(&config.database, Duration::from_millis(500)).unwrap();

    let mut applied = Vec::new();
    loop {
        match migrator.up_by_one(&mut conn).unwrap() {
            StepOutcome::Applied { version } => applied.push(version),
            StepOutcome::NoPending { current } => {
                assert_eq!(current, Some(3));
                break;
            }
        }
    }
    assert_eq!(applied, vec![1, 2, 3]);
}

#[test]
fn failing_file_migration_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_for(tmp.path());
    let dir = &config.migrations_dir;
    fs::create_dir_all(dir).unwrap();
    write(dir, "1_a.sql", "-- tern:up\nCREATE TABLE a (id INTEGER);\n");
    write(
        dir,
        "2_b.sql",
        "-- tern:up\nCREATE TABLE b (id INTEGER);\nINSERT INTO nope VALUES (1);\n",
    );
    write(dir, "3_c.sql", "-- tern:up\nCREATE TABLE c (id INTEGER);\n");

    let migrator = Migrator::from_config(&config).unwrap();
    let mut conn = open_database(&config.database, Duration::from_millis(500)).unwrap();

    let err = migrator.up(&mut conn).unwrap_err();
    assert!(matches!(err, Error::MigrationExecution { version: 2, .. }));
    assert_eq!(migrator.version(&conn).unwrap(), Some(1));

    write(dir, "2_b.sql", "-- tern:up\nCREATE TABLE b (id INTEGER);\n");
    let report = migrator.up(&mut conn).unwrap();
    assert_eq!(report.applied, vec![2, 3]);
}

#[test]
fn create_migration_writes_a_parsable_template() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 8, 7).unwrap();

    let path = create_migration(&dir, "Add Users", VersionScheme::Timestamp(now)).unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "20240305090807_add_users.sql"
    );

    let set = DirSource::new(&dir).collect(VersionRange::all()).unwrap();
    assert_eq!(set.versions(), vec![20240305090807]);
    assert!(set.first().unwrap().down.is_some());

}

#[test]
fn create_in_the_same_second_bumps_the_version() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 8, 7).unwrap();

    create_migration(&dir, "add users", VersionScheme::Timestamp(now)).unwrap();
    let path = create_migration(&dir, "add posts", VersionScheme::Timestamp(now)).unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "20240305090808_add_posts.sql"
    );

    let set = DirSource::new(&dir).collect(VersionRange::all()).unwrap();
    assert_eq!(set.versions(), vec![20240305090807, 20240305090808]);
}

#[test]
fn create_with_an_older_timestamp_sorts_last() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, "20250101000000_newer.sql", "-- tern:up\n");
    let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let path = create_migration(dir, "late", VersionScheme::Timestamp(earlier)).unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "20250101000001_late.sql"
    );
}

#[test]
fn create_after_the_largest_version_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write(dir, &format!("{}_top.sql", i64::MAX), "-- tern:up\n");

    let err = create_migration(dir, "overflow", VersionScheme::Sequential).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(fs::read_dir(dir).unwrap().count(), 1);
}

#[test]
fn sequential_create_continues_numbering() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    seed_migrations(&dir);

    let path = create_migration(&dir, "add_tags", VersionScheme::Sequential).unwrap();
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), "4_add_tags.sql");

    let empty = tmp.path().join("empty");
    let path = create_migration(&empty, "init", VersionScheme::Sequential).unwrap();
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), "1_init.sql");
}
