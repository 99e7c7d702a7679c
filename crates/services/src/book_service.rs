use std::sync::Arc;

use shelf_core::{
    model::{Book, BookId, ProgressLogEntry, ReadingSession, UserId},
    time::Clock,
};
use storage::repository::{
    BookRepository, NewBookRecord, ProgressRepository, SessionRepository,
};

use crate::error::BookServiceError;

/// Read-only snapshot of where a book stands: the row itself, the session
/// driving it, and the latest progress point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookOverview {
    pub book: Book,
    pub active_session: Option<ReadingSession>,
    pub latest_entry: Option<ProgressLogEntry>,
}

/// Book bookkeeping for the CLI surface: creation, lookup, and overviews.
pub struct BookService {
    clock: Clock,
    books: Arc<dyn BookRepository>,
    sessions: Arc<dyn SessionRepository>,
    entries: Arc<dyn ProgressRepository>,
}

impl BookService {
    #[must_use]
    pub fn new(
        clock: Clock,
        books: Arc<dyn BookRepository>,
        sessions: Arc<dyn SessionRepository>,
        entries: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            books,
            sessions,
            entries,
        }
    }

    /// Register a book to track.
    ///
    /// # Errors
    ///
    /// Returns validation errors (empty title, zero page count) and storage
    /// failures.
    pub async fn add_book(
        &self,
        title: &str,
        total_pages: Option<u32>,
        user_id: Option<UserId>,
    ) -> Result<Book, BookServiceError> {
        let record = NewBookRecord {
            user_id,
            title: title.to_string(),
            total_pages,
            created_at: self.clock.now(),
        };
        // Run domain validation before the insert so a bad title never
        // reaches storage.
        record
            .clone()
            .into_book(BookId::new(u64::MAX))
            .map_err(BookServiceError::Book)?;
        Ok(self.books.insert_book(record).await?)
    }

    /// Fetch a book by id.
    ///
    /// # Errors
    ///
    /// Returns `BookServiceError::BookNotFound` if missing.
    pub async fn get_book(&self, book_id: BookId) -> Result<Book, BookServiceError> {
        self.books
            .get_book(book_id)
            .await?
            .ok_or(BookServiceError::BookNotFound(book_id))
    }

    /// List tracked books in id order.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn list_books(&self, limit: u32) -> Result<Vec<Book>, BookServiceError> {
        Ok(self.books.list_books(limit).await?)
    }

    /// A book's sessions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn sessions_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReadingSession>, BookServiceError> {
        Ok(self.sessions.sessions_for_book(book_id).await?)
    }

    /// Snapshot a book, its active session, and its latest progress point.
    ///
    /// # Errors
    ///
    /// Returns `BookServiceError::BookNotFound` if the book is missing.
    pub async fn overview(&self, book_id: BookId) -> Result<BookOverview, BookServiceError> {
        let book = self.get_book(book_id).await?;
        let active_session = self.sessions.active_session(book_id).await?;
        let latest_entry = match &active_session {
            Some(session) => self
                .entries
                .entries_for_session(session.id())
                .await?
                .pop(),
            None => None,
        };

        Ok(BookOverview {
            book,
            active_session,
            latest_entry,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::time::fixed_clock;
    use storage::repository::Storage;

    fn service(storage: &Storage) -> BookService {
        BookService::new(
            fixed_clock(),
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
        )
    }

    #[tokio::test]
    async fn add_and_fetch_book() {
        let storage = Storage::in_memory();
        let books = service(&storage);

        let book = books.add_book("Dune", Some(600), None).await.unwrap();
        let fetched = books.get_book(book.id()).await.unwrap();
        assert_eq!(fetched.title(), "Dune");
    }

    #[tokio::test]
    async fn empty_title_is_rejected_before_storage() {
        let storage = Storage::in_memory();
        let books = service(&storage);

        let err = books.add_book("  ", None, None).await.unwrap_err();
        assert!(matches!(err, BookServiceError::Book(_)));
        assert!(books.list_books(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overview_of_untouched_book_is_bare() {
        let storage = Storage::in_memory();
        let books = service(&storage);

        let book = books.add_book("Dune", Some(600), None).await.unwrap();
        let overview = books.overview(book.id()).await.unwrap();
        assert!(overview.active_session.is_none());
        assert!(overview.latest_entry.is_none());
    }

    #[tokio::test]
    async fn missing_book_is_not_found() {
        let storage = Storage::in_memory();
        let books = service(&storage);

        let err = books.get_book(BookId::new(5)).await.unwrap_err();
        assert!(matches!(err, BookServiceError::BookNotFound(_)));
    }
}
