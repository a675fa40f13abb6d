//! Audiobook domain model.
//!
//! # Responsibility
//! - Define the `Book` aggregate with its owned chapters and bookmarks.
//! - Keep aggregate validation in one place for every write path.
//!
//! # Invariants
//! - A `Book` is always read and written as one unit with its children.
//! - `Clone` is the snapshot contract: a clone shares nothing with its source.

pub mod book;
