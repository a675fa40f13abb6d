//! In-memory mirror of the stored library.
//!
//! # Responsibility
//! - Hold every loaded book keyed by id, tagged with its partition.
//! - Keep per-partition insertion order for listing.
//! - Hand out deep copies only.
//!
//! # Invariants
//! - An id appears in `entries` exactly once and in exactly one order index,
//!   the one matching its partition tag.
//! - Every cached book carries `Some(id)` equal to its key.

use super::Partition;
use crate::model::book::{Book, BookId};
use crate::repo::book_repo::LoadedLibrary;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub(crate) type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CacheError {
    NotFound(BookId),
    WrongPartition { id: BookId, expected: Partition },
    DuplicateId(BookId),
    MissingId,
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "book {id} is not cached"),
            Self::WrongPartition { id, expected } => {
                write!(f, "book {id} is not in the {expected} partition")
            }
            Self::DuplicateId(id) => write!(f, "book {id} is already cached"),
            Self::MissingId => write!(f, "cannot cache a book without id"),
        }
    }
}

impl Error for CacheError {}

#[derive(Debug)]
struct CacheEntry {
    book: Book,
    partition: Partition,
}

#[derive(Debug, Default)]
pub(crate) struct LibraryCache {
    entries: HashMap<BookId, CacheEntry>,
    active: Vec<BookId>,
    orphaned: Vec<BookId>,
}

impl LibraryCache {
    /// Builds the cache from a full store load, keeping load order.
    pub(crate) fn from_loaded(loaded: LoadedLibrary) -> CacheResult<Self> {
        let mut cache = Self::default();
        for book in loaded.active {
            cache.insert(book, Partition::Active)?;
        }
        for book in loaded.orphaned {
            cache.insert(book, Partition::Orphaned)?;
        }
        Ok(cache)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn count(&self, partition: Partition) -> usize {
        match partition {
            Partition::Active => self.active.len(),
            Partition::Orphaned => self.orphaned.len(),
        }
    }

    pub(crate) fn find(&self, id: BookId) -> Option<Book> {
        self.entries.get(&id).map(|entry| entry.book.clone())
    }

    pub(crate) fn partition_of(&self, id: BookId) -> Option<Partition> {
        self.entries.get(&id).map(|entry| entry.partition)
    }

    /// Fails unless `id` is cached in `expected`.
    pub(crate) fn ensure_in(&self, id: BookId, expected: Partition) -> CacheResult<()> {
        match self.partition_of(id) {
            Some(partition) if partition == expected => Ok(()),
            Some(_) => Err(CacheError::WrongPartition { id, expected }),
            None => Err(CacheError::NotFound(id)),
        }
    }

    pub(crate) fn list_active(&self) -> Vec<Book> {
        self.snapshot(&self.active)
    }

    pub(crate) fn list_orphaned(&self) -> Vec<Book> {
        self.snapshot(&self.orphaned)
    }

    pub(crate) fn add_active(&mut self, book: Book) -> CacheResult<()> {
        self.insert(book, Partition::Active)
    }

    /// Appends `book` to the end of `partition`.
    pub(crate) fn insert(&mut self, book: Book, partition: Partition) -> CacheResult<()> {
        let id = book.id.ok_or(CacheError::MissingId)?;
        if self.entries.contains_key(&id) {
            return Err(CacheError::DuplicateId(id));
        }
        self.index_mut(partition).push(id);
        self.entries.insert(id, CacheEntry { book, partition });
        Ok(())
    }

    /// Swaps in a new version of a cached book; its partition and position
    /// in the listing are kept.
    pub(crate) fn replace(&mut self, book: Book) -> CacheResult<()> {
        let id = book.id.ok_or(CacheError::MissingId)?;
        let entry = self.entries.get_mut(&id).ok_or(CacheError::NotFound(id))?;
        entry.book = book;
        Ok(())
    }

    pub(crate) fn move_to_orphaned(&mut self, id: BookId) -> CacheResult<()> {
        self.move_between(id, Partition::Active, Partition::Orphaned)
    }

    pub(crate) fn move_to_active(&mut self, id: BookId) -> CacheResult<()> {
        self.move_between(id, Partition::Orphaned, Partition::Active)
    }

    fn move_between(&mut self, id: BookId, from: Partition, to: Partition) -> CacheResult<()> {
        self.ensure_in(id, from)?;
        self.index_mut(from).retain(|cached| *cached != id);
        self.index_mut(to).push(id);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.partition = to;
        }
        Ok(())
    }

    fn snapshot(&self, ids: &[BookId]) -> Vec<Book> {
        ids.iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| entry.book.clone())
            .collect()
    }

    fn index_mut(&mut self, partition: Partition) -> &mut Vec<BookId> {
        match partition {
            Partition::Active => &mut self.active,
            Partition::Orphaned => &mut self.orphaned,
        }
    }
}
