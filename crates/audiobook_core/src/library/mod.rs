//! Library facade over the book store and its in-memory mirror.
//!
//! # Responsibility
//! - Serialize every library operation behind one lock.
//! - Keep the cache in step with the store: persist first, then cache.
//! - Notify observers once per successful mutation, outside the lock.
//!
//! # Invariants
//! - Callers never reach the repository or cache directly.
//! - The cache never holds a book the store does not have.
//! - A book id lives in exactly one `Partition`.

use std::fmt::{Display, Formatter};

mod cache;
pub mod manager;
pub mod notifier;

/// Visibility partition of a cached book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Shown to the user.
    Active,
    /// Hidden, usually because its media went missing.
    Orphaned,
}

impl Display for Partition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Orphaned => write!(f, "orphaned"),
        }
    }
}
