use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use shelf_core::model::{recompute, Book, BookId, ProgressLogEntry};
use storage::repository::{
    BookRepository, LedgerPersistence, ProgressRepository, SessionRepository,
};

use crate::error::PageCountError;

/// Guards page-count edits against already-logged progress, and fans the
/// recompute out over every session of the book.
pub struct PageCountService {
    books: Arc<dyn BookRepository>,
    sessions: Arc<dyn SessionRepository>,
    entries: Arc<dyn ProgressRepository>,
    ledger: Arc<dyn LedgerPersistence>,
    // Shared with `ProgressService` so a recompute never interleaves with an
    // in-flight append.
    write_lock: Arc<Mutex<()>>,
}

impl PageCountService {
    #[must_use]
    pub fn new(
        books: Arc<dyn BookRepository>,
        sessions: Arc<dyn SessionRepository>,
        entries: Arc<dyn ProgressRepository>,
        ledger: Arc<dyn LedgerPersistence>,
        write_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            books,
            sessions,
            entries,
            ledger,
            write_lock,
        }
    }

    /// Change a book's total page count and rewrite every affected ledger.
    ///
    /// The new count must cover the highest page ever logged against the
    /// book, across all sessions and regardless of their status: archived
    /// and DNF histories are still displayed, so their percentages must stay
    /// consistent with the new total. Dropping the count to exactly the
    /// highest logged page is allowed. The book update and all entry
    /// rewrites commit as one transaction.
    ///
    /// # Errors
    ///
    /// Returns `PageCountError::Rejected` (naming both values) when the new
    /// count is below logged progress, `BookNotFound`, a validation error
    /// for a zero count, and storage failures.
    pub async fn change_total_pages(
        &self,
        book_id: BookId,
        new_total: u32,
    ) -> Result<Book, PageCountError> {
        let _guard = self.write_lock.lock().await;

        let mut book = self
            .books
            .get_book(book_id)
            .await?
            .ok_or(PageCountError::BookNotFound(book_id))?;

        if let Some(max_logged) = self.entries.max_logged_page(book_id).await? {
            if new_total < max_logged {
                warn!(
                    book_id = %book_id,
                    requested = new_total,
                    max_logged,
                    "page count change rejected"
                );
                return Err(PageCountError::Rejected {
                    requested: new_total,
                    max_logged,
                });
            }
        }

        book.set_total_pages(new_total)?;

        // Explicit fan-out over every session with progress; one transaction
        // wraps the whole batch.
        let mut rewritten: Vec<ProgressLogEntry> = Vec::new();
        let mut sessions_touched = 0_u32;
        for session in self.sessions.sessions_for_book(book_id).await? {
            let mut ledger_entries = self.entries.entries_for_session(session.id()).await?;
            if ledger_entries.is_empty() {
                continue;
            }
            recompute(&mut ledger_entries, new_total);
            rewritten.extend(ledger_entries);
            sessions_touched += 1;
        }

        self.ledger
            .apply_page_count_change(&book, &rewritten)
            .await?;

        info!(
            book_id = %book_id,
            new_total,
            sessions = sessions_touched,
            entries = rewritten.len(),
            "page count changed and ledgers recomputed"
        );

        Ok(book)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::model::ReadingStatus;
    use shelf_core::time::{fixed_clock, fixed_now, fixed_today};
    use storage::repository::{NewBookRecord, Storage};

    use crate::progress_service::{LogProgressInput, ProgressService};
    use crate::status_service::{SetStatusInput, StatusService};

    struct Fixture {
        storage: Storage,
        status: Arc<StatusService>,
        progress: ProgressService,
        page_counts: PageCountService,
    }

    fn fixture() -> Fixture {
        let storage = Storage::in_memory();
        let write_lock = Arc::new(Mutex::new(()));
        let status = Arc::new(StatusService::new(
            fixed_clock(),
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
            Arc::clone(&storage.ledger),
        ));
        let progress = ProgressService::new(
            fixed_clock(),
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
            Arc::clone(&status),
            Arc::clone(&write_lock),
        );
        let page_counts = PageCountService::new(
            Arc::clone(&storage.books),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.entries),
            Arc::clone(&storage.ledger),
            write_lock,
        );
        Fixture {
            storage,
            status,
            progress,
            page_counts,
        }
    }

    async fn seed_book(fx: &Fixture, total: Option<u32>) -> BookId {
        fx.storage
            .books
            .insert_book(NewBookRecord {
                user_id: None,
                title: "Dune".to_string(),
                total_pages: total,
                created_at: fixed_now(),
            })
            .await
            .unwrap()
            .id()
    }

    #[tokio::test]
    async fn reduction_below_logged_progress_is_rejected() {
        let fx = fixture();
        let book_id = seed_book(&fx, Some(600)).await;
        fx.status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();
        fx.progress
            .log_progress(book_id, LogProgressInput::at_page(350))
            .await
            .unwrap();

        let err = fx
            .page_counts
            .change_total_pages(book_id, 300)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PageCountError::Rejected {
                requested: 300,
                max_logged: 350
            }
        ));

        // The book keeps its old count.
        let book = fx.storage.books.get_book(book_id).await.unwrap().unwrap();
        assert_eq!(book.total_pages(), Some(600));
    }

    #[tokio::test]
    async fn reduction_to_exactly_the_max_logged_page_is_allowed() {
        let fx = fixture();
        let book_id = seed_book(&fx, Some(600)).await;
        fx.status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();
        fx.progress
            .log_progress(book_id, LogProgressInput::at_page(350))
            .await
            .unwrap();

        let book = fx
            .page_counts
            .change_total_pages(book_id, 350)
            .await
            .unwrap();
        assert_eq!(book.total_pages(), Some(350));

        let err = fx
            .page_counts
            .change_total_pages(book_id, 349)
            .await
            .unwrap_err();
        assert!(matches!(err, PageCountError::Rejected { .. }));
    }

    #[tokio::test]
    async fn change_recomputes_archived_sessions_too() {
        let fx = fixture();
        let book_id = seed_book(&fx, Some(300)).await;
        fx.status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();
        fx.progress
            .log_progress(
                book_id,
                LogProgressInput::at_page(150).on(fixed_today() - chrono::Days::new(1)),
            )
            .await
            .unwrap();

        // Backward movement freezes session 1 with its entry.
        fx.status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::ToRead))
            .await
            .unwrap();

        fx.page_counts.change_total_pages(book_id, 600).await.unwrap();

        let sessions = fx.storage.sessions.sessions_for_book(book_id).await.unwrap();
        let archived_entries = fx
            .storage
            .entries
            .entries_for_session(sessions[0].id())
            .await
            .unwrap();
        assert_eq!(archived_entries[0].current_page, 150);
        assert_eq!(archived_entries[0].current_percentage, 25);
    }

    #[tokio::test]
    async fn setting_a_count_backfills_percentages() {
        let fx = fixture();
        let book_id = seed_book(&fx, None).await;
        fx.progress
            .log_progress(book_id, LogProgressInput::at_page(100))
            .await
            .unwrap();

        fx.page_counts.change_total_pages(book_id, 400).await.unwrap();

        let session = fx
            .storage
            .sessions
            .active_session(book_id)
            .await
            .unwrap()
            .unwrap();
        let entries = fx
            .storage
            .entries
            .entries_for_session(session.id())
            .await
            .unwrap();
        assert_eq!(entries[0].current_percentage, 25);
    }

    #[tokio::test]
    async fn zero_total_is_a_validation_error() {
        let fx = fixture();
        let book_id = seed_book(&fx, Some(300)).await;

        let err = fx
            .page_counts
            .change_total_pages(book_id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, PageCountError::Book(_)));
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let fx = fixture();
        let err = fx
            .page_counts
            .change_total_pages(BookId::new(77), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, PageCountError::BookNotFound(_)));
    }
}
