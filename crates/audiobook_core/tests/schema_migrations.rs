use audiobook_core::db::migrations::{latest_version, upgrade};
use audiobook_core::db::{open_db, open_db_in_memory, DbError, SchemaUpgradeError};
use audiobook_core::{
    Book, BookRepository, BookType, Chapter, LibraryManager, NoopNotifier, SqliteBookRepository,
};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

const V2_SCHEMA_WITH_ONE_BOOK: &str = "
CREATE TABLE book (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    author TEXT,
    current_media_path TEXT NOT NULL,
    playback_speed REAL NOT NULL,
    root TEXT NOT NULL,
    time INTEGER NOT NULL,
    type TEXT NOT NULL,
    use_cover_replacement INTEGER NOT NULL
);
CREATE TABLE chapter (
    duration INTEGER NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    book_id INTEGER NOT NULL,
    FOREIGN KEY (book_id) REFERENCES book (id)
);
INSERT INTO book (name, author, current_media_path, playback_speed, root, time, type, use_cover_replacement)
VALUES ('Legacy', 'Old Author', '/legacy/02.mp3', 1.25, '/legacy', 4200, 'SINGLE_FOLDER', 1);
INSERT INTO chapter (duration, name, path, book_id) VALUES (1000, 'one', '/legacy/01.mp3', 1);
INSERT INTO chapter (duration, name, path, book_id) VALUES (2000, 'two', '/legacy/02.mp3', 1);
PRAGMA user_version = 2;
";

const V1_LEGACY_SCHEMA: &str = "
CREATE TABLE book (id INTEGER PRIMARY KEY, title TEXT, chapters_json TEXT);
INSERT INTO book (title, chapters_json) VALUES ('Ancient', '[]');
CREATE TABLE chapter (path TEXT);
PRAGMA user_version = 1;
";

#[test]
fn open_db_in_memory_creates_latest_schema() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "book");
    assert_table_exists(&conn, "chapter");
    assert_table_exists(&conn, "bookmark");
    assert!(column_exists(&conn, "book", "active"));
}

#[test]
fn reopening_database_keeps_schema_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.sqlite3");

    let mut conn = open_db(&path).unwrap();
    conn.execute_batch(
        "INSERT INTO book (name, current_media_path, playback_speed, root, time, type, use_cover_replacement)
         VALUES ('Kept', '/kept/01.mp3', 1.0, '/kept', 0, 'SINGLE_FILE', 0);
         INSERT INTO chapter (duration, name, path, book_id) VALUES (10, 'one', '/kept/01.mp3', 1);",
    )
    .unwrap();
    drop(conn);

    let mut conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let loaded = SqliteBookRepository::new(&mut conn).load().unwrap();
    assert_eq!(loaded.active.len(), 1);
    assert_eq!(loaded.active[0].name, "Kept");
}

#[test]
fn upgrading_recognized_version_preserves_books() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v2.sqlite3");
    Connection::open(&path)
        .unwrap()
        .execute_batch(V2_SCHEMA_WITH_ONE_BOOK)
        .unwrap();

    let mut conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "bookmark");
    assert!(column_exists(&conn, "book", "active"));

    let loaded = SqliteBookRepository::new(&mut conn).load().unwrap();
    assert!(loaded.orphaned.is_empty());
    assert_eq!(loaded.active.len(), 1);
    let book = &loaded.active[0];
    assert_eq!(book.name, "Legacy");
    assert_eq!(book.author.as_deref(), Some("Old Author"));
    assert_eq!(book.position(), (4200, "/legacy/02.mp3"));
    assert_eq!(book.playback_speed(), 1.25);
    assert!(book.use_cover_replacement);
    assert_eq!(book.chapters.len(), 2);
    assert!(book.bookmarks.is_empty());
}

#[test]
fn unknown_old_version_recreates_empty_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.sqlite3");
    Connection::open(&path)
        .unwrap()
        .execute_batch(V1_LEGACY_SCHEMA)
        .unwrap();

    let library = LibraryManager::open(&path, NoopNotifier).unwrap();
    assert!(library.list_active().unwrap().is_empty());
    assert!(library.list_orphaned().unwrap().is_empty());
    drop(library);

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert!(column_exists(&conn, "book", "active"));
    assert!(!column_exists(&conn, "book", "chapters_json"));
    assert_table_exists(&conn, "bookmark");
}

#[test]
fn upgrade_with_unknown_version_fails_before_touching_tables() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(V1_LEGACY_SCHEMA).unwrap();

    let tx = conn.transaction().unwrap();
    let err = upgrade(&tx, 1).unwrap_err();
    drop(tx);
    match err {
        DbError::SchemaUpgrade(SchemaUpgradeError::UnknownVersion { version, latest }) => {
            assert_eq!(version, 1);
            assert_eq!(latest, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(schema_version(&conn), 1);
    assert!(column_exists(&conn, "book", "chapters_json"));
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE book (id INTEGER PRIMARY KEY); PRAGMA user_version = 999;")
        .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 999);
    assert!(!column_exists(&conn, "book", "active"));
}

#[test]
fn concurrent_opens_upgrade_recognized_version_once() {
    const OPENERS: usize = 4;
    for round in 0..10 {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v2.sqlite3");
        Connection::open(&path)
            .unwrap()
            .execute_batch(V2_SCHEMA_WITH_ONE_BOOK)
            .unwrap();

        let results = open_concurrently(&path, OPENERS, |path| {
            open_db(path).map(drop).map_err(|err| err.to_string())
        });
        for result in results {
            assert_eq!(result, Ok(()), "round {round}");
        }

        let mut conn = open_db(&path).unwrap();
        assert_eq!(schema_version(&conn), latest_version());
        let loaded = SqliteBookRepository::new(&mut conn).load().unwrap();
        assert_eq!(loaded.active.len(), 1, "round {round}");
        assert_eq!(loaded.active[0].name, "Legacy");
    }
}

#[test]
fn concurrent_opens_recreate_unknown_version_once() {
    const OPENERS: usize = 4;
    for round in 0..10 {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.sqlite3");
        Connection::open(&path)
            .unwrap()
            .execute_batch(V1_LEGACY_SCHEMA)
            .unwrap();

        // Every opener stores a book right after opening; a late recreate
        // would drop the books committed by earlier openers.
        let results = open_concurrently(&path, OPENERS, |path| {
            let library = LibraryManager::open(path, NoopNotifier).map_err(|err| err.to_string())?;
            library
                .add_book(Book::new(
                    "/books/kept",
                    "Kept",
                    None,
                    BookType::SingleFile,
                    vec![Chapter::new("/books/kept/01.mp3", "one", 1_000)],
                ))
                .map(drop)
                .map_err(|err| err.to_string())
        });
        for result in results {
            assert_eq!(result, Ok(()), "round {round}");
        }

        let mut conn = open_db(&path).unwrap();
        let loaded = SqliteBookRepository::new(&mut conn).load().unwrap();
        assert_eq!(loaded.active.len(), OPENERS, "round {round}");
    }
}

fn open_concurrently(
    path: &Path,
    openers: usize,
    open: fn(&Path) -> Result<(), String>,
) -> Vec<Result<(), String>> {
    let barrier = Arc::new(Barrier::new(openers));
    let handles: Vec<_> = (0..openers)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let path = path.to_path_buf();
            thread::spawn(move || {
                barrier.wait();
                open(&path)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

fn column_exists(conn: &Connection, table_name: &str, column: &str) -> bool {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2;",
            [table_name, column],
            |row| row.get(0),
        )
        .unwrap();
    count > 0
}
