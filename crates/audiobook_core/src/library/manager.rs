//! Library manager facade.
//!
//! # Responsibility
//! - Single entry point for adding, reading, updating, hiding and revealing
//!   books.
//! - Coordinate `SqliteBookRepository` writes with `LibraryCache` updates.
//!
//! # Invariants
//! - Every operation holds the state lock for its whole duration.
//! - Mutations run validate -> persist -> cache -> unlock -> notify. A
//!   failed write leaves the cache untouched.
//! - Everything handed to callers or observers is a deep copy.

use super::cache::{CacheError, LibraryCache};
use super::notifier::{ChangeNotifier, NoopNotifier};
use super::Partition;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::book::{Book, BookId, BookValidationError};
use crate::repo::book_repo::{BookRepository, RepoError, SqliteBookRepository};
use log::{error, info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

pub type LibraryResult<T> = Result<T, LibraryError>;

/// Error surfaced by library manager operations.
#[derive(Debug)]
pub enum LibraryError {
    /// Book failed aggregate validation; nothing was written.
    Validation(BookValidationError),
    /// No book with this id exists.
    NotFound(BookId),
    /// The book exists but is in the other partition.
    WrongPartition { id: BookId, expected: Partition },
    /// Store failure; the cache is unchanged.
    Storage(RepoError),
    /// A previous operation panicked while holding the lock.
    LockPoisoned,
    /// Cache and store disagree about a book.
    InconsistentState(String),
}

impl Display for LibraryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "book not found: {id}"),
            Self::WrongPartition { id, expected } => {
                write!(f, "book {id} is not in the {expected} partition")
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::LockPoisoned => write!(f, "library lock poisoned"),
            Self::InconsistentState(details) => write!(f, "inconsistent library state: {details}"),
        }
    }
}

impl Error for LibraryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BookValidationError> for LibraryError {
    fn from(value: BookValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for LibraryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<DbError> for LibraryError {
    fn from(value: DbError) -> Self {
        Self::Storage(RepoError::Db(value))
    }
}

impl From<CacheError> for LibraryError {
    fn from(value: CacheError) -> Self {
        match value {
            CacheError::NotFound(id) => Self::NotFound(id),
            CacheError::WrongPartition { id, expected } => Self::WrongPartition { id, expected },
            other => Self::InconsistentState(other.to_string()),
        }
    }
}

struct LibraryState {
    conn: Connection,
    cache: LibraryCache,
}

/// Owner of the library store and its cache.
///
/// Build one at startup and share it (e.g. behind `Arc`); there is no
/// process-wide instance.
pub struct LibraryManager<N: ChangeNotifier = NoopNotifier> {
    state: Mutex<LibraryState>,
    notifier: N,
}

impl<N: ChangeNotifier> LibraryManager<N> {
    /// Opens the library file at `path`, ensuring its schema, and loads it.
    pub fn open(path: impl AsRef<Path>, notifier: N) -> LibraryResult<Self> {
        let conn = open_db(path)?;
        Self::new(conn, notifier)
    }

    /// Opens an empty in-memory library.
    pub fn open_in_memory(notifier: N) -> LibraryResult<Self> {
        let conn = open_db_in_memory()?;
        Self::new(conn, notifier)
    }

    /// Loads the full library from a connection prepared by `open_db`.
    pub fn new(mut conn: Connection, notifier: N) -> LibraryResult<Self> {
        let started_at = Instant::now();
        let loaded = SqliteBookRepository::new(&mut conn).load()?;
        let cache = LibraryCache::from_loaded(loaded)?;
        info!(
            "event=library_load module=library status=ok books={} active={} orphaned={} duration_ms={}",
            cache.len(),
            cache.count(Partition::Active),
            cache.count(Partition::Orphaned),
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            state: Mutex::new(LibraryState { conn, cache }),
            notifier,
        })
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Stores a new book in the active partition and returns the stored copy
    /// carrying its assigned id.
    ///
    /// Any id already set on `book` is ignored.
    ///
    /// # Errors
    /// - `Validation` when the book breaks an aggregate invariant; nothing
    ///   is written.
    /// - `Storage` when the insert transaction fails; nothing is written.
    pub fn add_book(&self, book: Book) -> LibraryResult<Book> {
        let started_at = Instant::now();
        let result = self.add_book_locked(book);
        log_outcome("book_add", started_at, &result, |(stored, _)| stored.id);

        let (stored, active) = result?;
        self.notifier.on_library_changed(&active);
        Ok(stored)
    }

    /// Returns a copy of the active book with `id`. Orphaned books are only
    /// reachable through `list_orphaned`.
    pub fn get_book(&self, id: BookId) -> LibraryResult<Option<Book>> {
        let state = self.lock()?;
        match state.cache.partition_of(id) {
            Some(Partition::Active) => Ok(state.cache.find(id)),
            _ => Ok(None),
        }
    }

    /// Returns copies of the active books in insertion order.
    pub fn list_active(&self) -> LibraryResult<Vec<Book>> {
        Ok(self.lock()?.cache.list_active())
    }

    /// Returns copies of the orphaned books in the order they were hidden.
    pub fn list_orphaned(&self) -> LibraryResult<Vec<Book>> {
        Ok(self.lock()?.cache.list_orphaned())
    }

    /// Replaces a stored active book, chapters and bookmarks included.
    ///
    /// # Errors
    /// - `Validation` for invalid books or books without id.
    /// - `NotFound` when no active book has this id; orphaned books must be
    ///   revealed first.
    /// - `Storage` when the replace transaction fails; store and cache keep
    ///   the previous version.
    pub fn update_book(&self, book: Book) -> LibraryResult<()> {
        let started_at = Instant::now();
        let result = self.update_book_locked(book);
        log_outcome("book_update", started_at, &result, |book| book.id);

        let updated = result?;
        self.notifier.on_book_changed(&updated);
        Ok(())
    }

    /// Moves an active book to the orphaned partition.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids.
    /// - `WrongPartition` when the book is already hidden.
    pub fn hide_book(&self, id: BookId) -> LibraryResult<()> {
        let started_at = Instant::now();
        let result = self.move_book_locked(id, Partition::Active, Partition::Orphaned);
        log_outcome("book_hide", started_at, &result, |_| Some(id));

        let active = result?;
        self.notifier.on_library_changed(&active);
        Ok(())
    }

    /// Moves an orphaned book back to the active partition.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids.
    /// - `WrongPartition` when the book is already active.
    pub fn reveal_book(&self, id: BookId) -> LibraryResult<()> {
        let started_at = Instant::now();
        let result = self.move_book_locked(id, Partition::Orphaned, Partition::Active);
        log_outcome("book_reveal", started_at, &result, |_| Some(id));

        let active = result?;
        self.notifier.on_library_changed(&active);
        Ok(())
    }

    fn add_book_locked(&self, mut book: Book) -> LibraryResult<(Book, Vec<Book>)> {
        book.validate()?;

        let mut state = self.lock()?;
        let state = &mut *state;
        let id = SqliteBookRepository::new(&mut state.conn).insert_book(&book)?;
        book.id = Some(id);
        state.cache.add_active(book.clone())?;
        Ok((book, state.cache.list_active()))
    }

    fn update_book_locked(&self, book: Book) -> LibraryResult<Book> {
        book.validate()?;
        let id = book.id.ok_or(BookValidationError::MissingId)?;

        let mut state = self.lock()?;
        let state = &mut *state;
        if state.cache.partition_of(id) != Some(Partition::Active) {
            return Err(LibraryError::NotFound(id));
        }
        SqliteBookRepository::new(&mut state.conn).replace_book(&book)?;
        state.cache.replace(book.clone())?;
        Ok(book)
    }

    fn move_book_locked(
        &self,
        id: BookId,
        from: Partition,
        to: Partition,
    ) -> LibraryResult<Vec<Book>> {
        let mut state = self.lock()?;
        let state = &mut *state;
        state.cache.ensure_in(id, from)?;
        SqliteBookRepository::new(&mut state.conn).set_active(id, to == Partition::Active)?;
        match to {
            Partition::Active => state.cache.move_to_active(id)?,
            Partition::Orphaned => state.cache.move_to_orphaned(id)?,
        }
        Ok(state.cache.list_active())
    }

    fn lock(&self) -> LibraryResult<MutexGuard<'_, LibraryState>> {
        self.state.lock().map_err(|_| LibraryError::LockPoisoned)
    }
}

fn log_outcome<T>(
    event: &str,
    started_at: Instant,
    result: &LibraryResult<T>,
    book_id: impl FnOnce(&T) -> Option<BookId>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(value) => info!(
            "event={event} module=library status=ok book_id={} duration_ms={duration_ms}",
            book_id(value).map_or_else(|| "none".to_string(), |id| id.to_string())
        ),
        Err(err @ (LibraryError::Validation(_)
        | LibraryError::NotFound(_)
        | LibraryError::WrongPartition { .. })) => warn!(
            "event={event} module=library status=error error_code={} duration_ms={duration_ms} error={err}",
            error_code(err)
        ),
        Err(err) => error!(
            "event={event} module=library status=error error_code={} duration_ms={duration_ms} error={err}",
            error_code(err)
        ),
    }
}

fn error_code(err: &LibraryError) -> &'static str {
    match err {
        LibraryError::Validation(_) => "validation_failed",
        LibraryError::NotFound(_) => "book_not_found",
        LibraryError::WrongPartition { .. } => "wrong_partition",
        LibraryError::Storage(_) => "storage_failed",
        LibraryError::LockPoisoned => "lock_poisoned",
        LibraryError::InconsistentState(_) => "inconsistent_state",
    }
}
