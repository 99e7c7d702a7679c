//! Shared error types for the services crate.

use thiserror::Error;

use shelf_core::model::{BookError, BookId, ProgressError, SessionError, SessionId};
use shelf_core::timeline::TimelineConflict;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `BookService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BookServiceError {
    #[error("book {0} not found")]
    BookNotFound(BookId),
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `StatusService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatusError {
    #[error("book {0} not found")]
    BookNotFound(BookId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("book {0} not found")]
    BookNotFound(BookId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Timeline(#[from] TimelineConflict),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `PageCountService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageCountError {
    #[error("book {0} not found")]
    BookNotFound(BookId),
    #[error(
        "cannot reduce page count to {requested}: progress is already logged up to page {max_logged}"
    )]
    Rejected { requested: u32, max_logged: u32 },
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
