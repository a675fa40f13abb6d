//! Book repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist whole book aggregates across `book`, `chapter` and `bookmark`.
//! - Rebuild the full library, partitioned by the `active` flag, on load.
//!
//! # Invariants
//! - Inserts and replaces run in one transaction each; a failure rolls back
//!   every row touched by the call.
//! - Replacing a book deletes and reinserts all of its chapters and
//!   bookmarks. Child rows are never diffed, so after a replace the stored
//!   children equal the in-memory lists exactly.
//! - Write paths call `Book::validate()` before any SQL runs.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::book::{Book, BookId, BookType, BookValidationError, Bookmark, Chapter};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const BOOK_SELECT_SQL: &str = "SELECT
    id,
    name,
    author,
    current_media_path,
    playback_speed,
    root,
    time,
    type,
    use_cover_replacement,
    active
FROM book
ORDER BY id ASC";

// Child rows have no explicit key; rowid preserves insertion order.
const CHAPTER_SELECT_SQL: &str = "SELECT duration, name, path
FROM chapter
WHERE book_id = ?1
ORDER BY rowid ASC";

const BOOKMARK_SELECT_SQL: &str = "SELECT path, title, time
FROM bookmark
WHERE book_id = ?1
ORDER BY rowid ASC";

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-level error for book persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(BookValidationError),
    Db(DbError),
    NotFound(BookId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "book not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted book data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<BookValidationError> for RepoError {
    fn from(value: BookValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Full library as stored, split by the persisted `active` flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedLibrary {
    /// Active books in id order.
    pub active: Vec<Book>,
    /// Hidden books in id order.
    pub orphaned: Vec<Book>,
}

/// Repository interface for book aggregates.
pub trait BookRepository {
    /// Reads every stored book with its chapters and bookmarks.
    fn load(&self) -> RepoResult<LoadedLibrary>;
    /// Stores a new active book and returns the assigned id.
    ///
    /// Any id already set on `book` is ignored.
    fn insert_book(&mut self, book: &Book) -> RepoResult<BookId>;
    /// Overwrites the stored book with the same id, children included.
    fn replace_book(&mut self, book: &Book) -> RepoResult<()>;
    /// Flips the stored `active` flag. Children are untouched.
    fn set_active(&mut self, id: BookId, active: bool) -> RepoResult<()>;
}

/// SQLite-backed book repository.
pub struct SqliteBookRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteBookRepository<'conn> {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl BookRepository for SqliteBookRepository<'_> {
    fn load(&self) -> RepoResult<LoadedLibrary> {
        let mut stmt = self.conn.prepare(BOOK_SELECT_SQL)?;
        let mut rows = stmt.query([])?;
        let mut library = LoadedLibrary::default();

        while let Some(row) = rows.next()? {
            let id: BookId = row.get("id")?;
            let (mut book, active) = parse_book_row(id, row)?;
            book.chapters = load_chapters(self.conn, id)?;
            book.bookmarks = load_bookmarks(self.conn, id)?;
            book.validate()
                .map_err(|err| RepoError::InvalidData(format!("book {id}: {err}")))?;

            if active {
                library.active.push(book);
            } else {
                library.orphaned.push(book);
            }
        }

        Ok(library)
    }

    fn insert_book(&mut self, book: &Book) -> RepoResult<BookId> {
        book.validate()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO book (
                name,
                author,
                current_media_path,
                playback_speed,
                root,
                time,
                type,
                use_cover_replacement,
                active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1);",
            params![
                book.name.as_str(),
                book.author.as_deref(),
                book.current_media_path.as_str(),
                f64::from(book.playback_speed),
                book.root.as_str(),
                book.time,
                book.kind.as_str(),
                bool_to_int(book.use_cover_replacement),
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_children(&tx, id, book)?;
        tx.commit()?;

        Ok(id)
    }

    fn replace_book(&mut self, book: &Book) -> RepoResult<()> {
        book.validate()?;
        let id = book.id.ok_or(BookValidationError::MissingId)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE book
             SET
                name = ?1,
                author = ?2,
                current_media_path = ?3,
                playback_speed = ?4,
                root = ?5,
                time = ?6,
                type = ?7,
                use_cover_replacement = ?8
             WHERE id = ?9;",
            params![
                book.name.as_str(),
                book.author.as_deref(),
                book.current_media_path.as_str(),
                f64::from(book.playback_speed),
                book.root.as_str(),
                book.time,
                book.kind.as_str(),
                bool_to_int(book.use_cover_replacement),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        tx.execute("DELETE FROM chapter WHERE book_id = ?1;", [id])?;
        tx.execute("DELETE FROM bookmark WHERE book_id = ?1;", [id])?;
        insert_children(&tx, id, book)?;
        tx.commit()?;

        Ok(())
    }

    fn set_active(&mut self, id: BookId, active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE book SET active = ?1 WHERE id = ?2;",
            params![bool_to_int(active), id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

fn insert_children(tx: &Transaction<'_>, id: BookId, book: &Book) -> RepoResult<()> {
    let mut chapter_stmt = tx.prepare_cached(
        "INSERT INTO chapter (duration, name, path, book_id) VALUES (?1, ?2, ?3, ?4);",
    )?;
    for chapter in &book.chapters {
        chapter_stmt.execute(params![
            chapter.duration,
            chapter.name.as_str(),
            chapter.path.as_str(),
            id,
        ])?;
    }

    let mut bookmark_stmt = tx.prepare_cached(
        "INSERT INTO bookmark (path, title, time, book_id) VALUES (?1, ?2, ?3, ?4);",
    )?;
    for bookmark in &book.bookmarks {
        bookmark_stmt.execute(params![
            bookmark.path.as_str(),
            bookmark.title.as_str(),
            bookmark.time,
            id,
        ])?;
    }

    Ok(())
}

fn load_chapters(conn: &Connection, id: BookId) -> RepoResult<Vec<Chapter>> {
    let mut stmt = conn.prepare_cached(CHAPTER_SELECT_SQL)?;
    let chapters = stmt
        .query_map([id], |row| {
            Ok(Chapter {
                duration: row.get("duration")?,
                name: row.get("name")?,
                path: row.get("path")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chapters)
}

fn load_bookmarks(conn: &Connection, id: BookId) -> RepoResult<Vec<Bookmark>> {
    let mut stmt = conn.prepare_cached(BOOKMARK_SELECT_SQL)?;
    let bookmarks = stmt
        .query_map([id], |row| {
            Ok(Bookmark {
                path: row.get("path")?,
                title: row.get("title")?,
                time: row.get("time")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bookmarks)
}

/// Parses one `book` row; children are filled in by the caller.
fn parse_book_row(id: BookId, row: &Row<'_>) -> RepoResult<(Book, bool)> {
    let type_text: String = row.get("type")?;
    let kind = BookType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid book type `{type_text}` in book.type"))
    })?;

    let use_cover_replacement =
        int_to_bool(row.get("use_cover_replacement")?, "book.use_cover_replacement")?;
    let active = int_to_bool(row.get("active")?, "book.active")?;
    let playback_speed: f64 = row.get("playback_speed")?;

    let book = Book {
        id: Some(id),
        name: row.get("name")?,
        author: row.get("author")?,
        root: row.get("root")?,
        playback_speed: playback_speed as f32,
        time: row.get("time")?,
        current_media_path: row.get("current_media_path")?,
        kind,
        use_cover_replacement,
        chapters: Vec::new(),
        bookmarks: Vec::new(),
    };
    Ok((book, active))
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
