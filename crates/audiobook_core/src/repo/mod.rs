//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contract for book aggregates.
//! - Isolate SQLite query details from the library manager.
//!
//! # Invariants
//! - Repository writes must enforce `Book::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod book_repo;
