//! Book aggregate model.
//!
//! # Responsibility
//! - Define the canonical book record with ordered chapters and bookmarks.
//! - Expose playback position/speed accessors for the playback layer.
//!
//! # Invariants
//! - A valid book has at least one chapter.
//! - Chapter paths are unique within a book.
//! - `set_position`/`set_playback_speed` only accept a chapter path of the
//!   book and a finite speed above zero. Stored values are taken as they are.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned book identifier.
pub type BookId = i64;

/// How the book was assembled from media on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookType {
    /// Folder holding several books, this one being a sub folder.
    CollectionFolder,
    /// Folder holding several books, this one being a single file.
    CollectionFile,
    /// One folder, one book.
    SingleFolder,
    /// One file, one book.
    SingleFile,
}

impl BookType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CollectionFolder => "COLLECTION_FOLDER",
            Self::CollectionFile => "COLLECTION_FILE",
            Self::SingleFolder => "SINGLE_FOLDER",
            Self::SingleFile => "SINGLE_FILE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COLLECTION_FOLDER" => Some(Self::CollectionFolder),
            "COLLECTION_FILE" => Some(Self::CollectionFile),
            "SINGLE_FOLDER" => Some(Self::SingleFolder),
            "SINGLE_FILE" => Some(Self::SingleFile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Media file path, unique within the owning book.
    pub path: String,
    pub name: String,
    /// Duration in milliseconds.
    pub duration: i64,
}

impl Chapter {
    pub fn new(path: impl Into<String>, name: impl Into<String>, duration: i64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Path of the chapter the bookmark points into.
    pub path: String,
    pub title: String,
    /// Offset inside the chapter in milliseconds.
    pub time: i64,
}

impl Bookmark {
    pub fn new(path: impl Into<String>, title: impl Into<String>, time: i64) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            time,
        }
    }
}

/// Validation failures for the book aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum BookValidationError {
    EmptyChapters,
    DuplicateChapterPath(String),
    UnknownMediaPath(String),
    InvalidPlaybackSpeed(f32),
    /// Replacing requires a book that already went through the store.
    MissingId,
}

impl Display for BookValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyChapters => write!(f, "book must contain at least one chapter"),
            Self::DuplicateChapterPath(path) => write!(f, "duplicate chapter path `{path}`"),
            Self::UnknownMediaPath(path) => {
                write!(f, "current media path `{path}` is not a chapter of the book")
            }
            Self::InvalidPlaybackSpeed(speed) => write!(f, "invalid playback speed {speed}"),
            Self::MissingId => write!(f, "book has no id; it was never stored"),
        }
    }
}

impl Error for BookValidationError {}

/// Audiobook aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// `None` until the store assigns an id on first insert.
    pub id: Option<BookId>,
    pub name: String,
    pub author: Option<String>,
    /// Folder or file the book was discovered at.
    pub root: String,
    pub playback_speed: f32,
    /// Position inside `current_media_path` in milliseconds.
    pub time: i64,
    pub current_media_path: String,
    #[serde(rename = "type")]
    pub kind: BookType,
    pub use_cover_replacement: bool,
    pub chapters: Vec<Chapter>,
    pub bookmarks: Vec<Bookmark>,
}

impl Book {
    /// Creates an unsaved book positioned at the start of its first chapter.
    ///
    /// The result is only valid if `chapters` is non-empty; `validate` is
    /// enforced by every write path, not here.
    pub fn new(
        root: impl Into<String>,
        name: impl Into<String>,
        author: Option<String>,
        kind: BookType,
        chapters: Vec<Chapter>,
    ) -> Self {
        let current_media_path = chapters
            .first()
            .map(|chapter| chapter.path.clone())
            .unwrap_or_default();
        Self {
            id: None,
            name: name.into(),
            author,
            root: root.into(),
            playback_speed: 1.0,
            time: 0,
            current_media_path,
            kind,
            use_cover_replacement: false,
            chapters,
            bookmarks: Vec::new(),
        }
    }

    /// Checks aggregate invariants enforced on every write and load.
    ///
    /// # Errors
    /// - `EmptyChapters` when there is no chapter.
    /// - `DuplicateChapterPath` when two chapters share a path.
    pub fn validate(&self) -> Result<(), BookValidationError> {
        if self.chapters.is_empty() {
            return Err(BookValidationError::EmptyChapters);
        }

        let mut seen = HashSet::with_capacity(self.chapters.len());
        for chapter in &self.chapters {
            if !seen.insert(chapter.path.as_str()) {
                return Err(BookValidationError::DuplicateChapterPath(
                    chapter.path.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Returns `(time_ms, chapter_path)` of the playback position.
    pub fn position(&self) -> (i64, &str) {
        (self.time, self.current_media_path.as_str())
    }

    /// Moves the playback position into the chapter at `path`.
    pub fn set_position(
        &mut self,
        time: i64,
        path: impl Into<String>,
    ) -> Result<(), BookValidationError> {
        let path = path.into();
        if !self.chapters.iter().any(|chapter| chapter.path == path) {
            return Err(BookValidationError::UnknownMediaPath(path));
        }
        self.time = time;
        self.current_media_path = path;
        Ok(())
    }

    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    pub fn set_playback_speed(&mut self, speed: f32) -> Result<(), BookValidationError> {
        validate_speed(speed)?;
        self.playback_speed = speed;
        Ok(())
    }

    /// Chapter the playback position currently points into.
    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.chapters
            .iter()
            .find(|chapter| chapter.path == self.current_media_path)
    }

    /// Total duration of all chapters in milliseconds.
    pub fn duration(&self) -> i64 {
        self.chapters.iter().map(|chapter| chapter.duration).sum()
    }
}

fn validate_speed(speed: f32) -> Result<(), BookValidationError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(BookValidationError::InvalidPlaybackSpeed(speed))
    }
}
