//! Change notification contract for library observers.

use crate::model::book::Book;
use std::sync::Arc;

/// Receives library changes after they have been persisted and cached.
///
/// Called once per successful mutation, after the manager lock has been
/// released, so implementations may call back into the manager.
pub trait ChangeNotifier {
    /// The set of active books changed (add, hide, reveal).
    fn on_library_changed(&self, active: &[Book]);
    /// The content of one book changed (update).
    fn on_book_changed(&self, book: &Book);
}

/// Notifier that drops every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn on_library_changed(&self, _active: &[Book]) {}

    fn on_book_changed(&self, _book: &Book) {}
}

impl<T: ChangeNotifier + ?Sized> ChangeNotifier for Arc<T> {
    fn on_library_changed(&self, active: &[Book]) {
        (**self).on_library_changed(active);
    }

    fn on_book_changed(&self, book: &Book) {
        (**self).on_book_changed(book);
    }
}
