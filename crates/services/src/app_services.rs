use std::sync::Arc;
use tokio::sync::Mutex;

use storage::repository::Storage;

use crate::Clock;
use crate::book_service::BookService;
use crate::error::AppServicesError;
use crate::page_count_service::PageCountService;
use crate::progress_service::ProgressService;
use crate::status_service::StatusService;

/// Assembles the app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    books: Arc<BookService>,
    status: Arc<StatusService>,
    progress: Arc<ProgressService>,
    page_counts: Arc<PageCountService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Wire services over an existing storage handle (used by tests with the
    /// in-memory backend).
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        // One advisory lock per storage handle: appends and page-count
        // recomputes are linearized against each other.
        let write_lock = Arc::new(Mutex::new(()));

        let status = Arc::new(StatusService::new(
            clock,
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
            Arc::clone(&storage.ledger),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
            Arc::clone(&status),
            Arc::clone(&write_lock),
        ));
        let page_counts = Arc::new(PageCountService::new(
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
            Arc::clone(&storage.ledger),
            write_lock,
        ));
        let books = Arc::new(BookService::new(
            clock,
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
        ));

        Self {
            books,
            status,
            progress,
            page_counts,
        }
    }

    #[must_use]
    pub fn books(&self) -> Arc<BookService> {
        Arc::clone(&self.books)
    }

    #[must_use]
    pub fn status(&self) -> Arc<StatusService> {
        Arc::clone(&self.status)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn page_counts(&self) -> Arc<PageCountService> {
        Arc::clone(&self.page_counts)
    }
}
