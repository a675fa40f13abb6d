//! Core persistence for the audiobook library.
//! This crate owns the durable book store and its in-memory mirror.

pub mod db;
pub mod library;
pub mod logging;
pub mod model;
pub mod repo;

pub use db::{open_db, open_db_in_memory, DbError, DbResult, SchemaUpgradeError};
pub use library::manager::{LibraryError, LibraryManager, LibraryResult};
pub use library::notifier::{ChangeNotifier, NoopNotifier};
pub use library::Partition;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::book::{Book, BookId, BookType, BookValidationError, Bookmark, Chapter};
pub use repo::book_repo::{
    BookRepository, LoadedLibrary, RepoError, RepoResult, SqliteBookRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
