use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use shelf_core::{
    model::{
        pages_read, BookId, ProgressLogEntry, ProgressMeasure, ReadingSession, ReadingStatus,
        SessionId,
    },
    time::Clock,
    timeline,
};
use storage::repository::{
    BookRepository, NewProgressEntry, NewSessionRecord, ProgressRepository, SessionRepository,
};

use crate::error::LedgerError;
use crate::status_service::StatusService;

//
// ─── INPUTS & OUTCOMES ─────────────────────────────────────────────────────────
//

/// A raw progress submission: exactly one measure, an optional date (today
/// when omitted), and optional notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogProgressInput {
    pub current_page: Option<u32>,
    pub current_percentage: Option<u32>,
    pub progress_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl LogProgressInput {
    #[must_use]
    pub fn at_page(page: u32) -> Self {
        Self {
            current_page: Some(page),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at_percentage(percentage: u32) -> Self {
        Self {
            current_percentage: Some(percentage),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.progress_date = Some(date);
        self
    }
}

/// Result of a progress submission.
///
/// `completion_reached` is surfaced so callers can kick off dependent
/// recalculations (streaks, goals) without the ledger knowing about them;
/// `session` reflects any auto-completion that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressOutcome {
    pub entry: ProgressLogEntry,
    pub session: ReadingSession,
    pub completion_reached: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Owns the progress ledger: validation, appends, delta computation, and the
/// automatic completion transition.
pub struct ProgressService {
    clock: Clock,
    books: Arc<dyn BookRepository>,
    sessions: Arc<dyn SessionRepository>,
    entries: Arc<dyn ProgressRepository>,
    status: Arc<StatusService>,
    // Serializes validate-then-append so two in-flight submissions cannot
    // both pass the timeline check and then both write.
    write_lock: Arc<Mutex<()>>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        books: Arc<dyn BookRepository>,
        sessions: Arc<dyn SessionRepository>,
        entries: Arc<dyn ProgressRepository>,
        status: Arc<StatusService>,
        write_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            clock,
            books,
            sessions,
            entries,
            status,
            write_lock,
        }
    }

    /// Append a progress observation to the book's active session.
    ///
    /// Runs the timeline validator first and fails without writing anything
    /// on a violation. A book with no active session gets one in `reading`
    /// status. When the derived percentage reaches 100 and the session is
    /// `reading`, the session auto-finishes with the entry's date.
    ///
    /// # Errors
    ///
    /// Returns validation errors (`Progress`), monotonicity conflicts
    /// (`Timeline`), `BookNotFound`, and storage failures.
    pub async fn log_progress(
        &self,
        book_id: BookId,
        input: LogProgressInput,
    ) -> Result<ProgressOutcome, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let book = self
            .books
            .get_book(book_id)
            .await?
            .ok_or(LedgerError::BookNotFound(book_id))?;

        let measure = ProgressMeasure::from_input(input.current_page, input.current_percentage)?;
        let progress_date = input.progress_date.unwrap_or_else(|| self.clock.today());
        let resolved = measure.resolve(book.total_pages())?;

        let session = match self.sessions.active_session(book_id).await? {
            Some(session) => session,
            None => {
                // Logging progress against an untracked book implicitly
                // starts reading it.
                let number = self
                    .sessions
                    .max_session_number(book_id)
                    .await?
                    .map_or(1, |n| n + 1);
                let mut record = NewSessionRecord::fresh(
                    book_id,
                    book.user_id(),
                    number,
                    ReadingStatus::Reading,
                    self.clock.now(),
                );
                record.started_date = Some(progress_date);
                self.sessions.insert_session(record).await?
            }
        };

        let existing = self.entries.entries_for_session(session.id()).await?;
        timeline::validate(
            &existing,
            progress_date,
            measure.value(),
            measure.unit(),
            None,
        )?;

        // Chronological predecessor: entries are ordered by (date, id), and
        // the new entry's id will sort after anything sharing its date.
        let previous_page = existing
            .iter()
            .rev()
            .find(|e| e.progress_date <= progress_date)
            .map_or(0, |e| e.current_page);

        // Only the first later entry changes: its predecessor becomes the
        // new entry. Everything beyond it keeps its old neighbor.
        let mut rewrites = Vec::new();
        if let Some(first_after) = existing.iter().find(|e| e.progress_date > progress_date) {
            let delta = pages_read(first_after.current_page, resolved.page);
            if delta != first_after.pages_read {
                let mut displaced = first_after.clone();
                displaced.pages_read = delta;
                rewrites.push(displaced);
            }
        }

        let record = NewProgressEntry {
            book_id,
            session_id: session.id(),
            user_id: session.user_id(),
            current_page: resolved.page,
            current_percentage: resolved.percentage,
            pages_read: pages_read(resolved.page, previous_page),
            progress_date,
            notes: input.notes,
            created_at: self.clock.now(),
        };
        let entry = self.entries.append_entry(record, &rewrites).await?;

        debug!(
            book_id = %book_id,
            session = session.session_number(),
            page = entry.current_page,
            percentage = entry.current_percentage,
            "progress logged"
        );

        let completion_reached = resolved.percentage >= 100;
        let session = if session.completion_due(resolved.percentage) {
            let finished = self
                .status
                .complete_session(session.id(), progress_date)
                .await?;
            info!(book_id = %book_id, "book finished via progress log");
            finished
        } else {
            session
        };

        Ok(ProgressOutcome {
            entry,
            session,
            completion_reached,
        })
    }

    /// A session's ledger in chronological order, for display.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn entries_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ProgressLogEntry>, LedgerError> {
        Ok(self.entries.entries_for_session(session_id).await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::time::{fixed_clock, fixed_now, fixed_today};
    use shelf_core::timeline::TimelineConflict;
    use storage::repository::{NewBookRecord, Storage};

    use crate::status_service::SetStatusInput;

    fn services(storage: &Storage) -> (ProgressService, Arc<StatusService>) {
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
            Arc::new(Mutex::new(())),
        );
        (progress, status)
    }

    async fn seed_book(storage: &Storage, total: Option<u32>) -> BookId {
        storage
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
    async fn first_entry_gets_full_delta_and_derived_percentage() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, status) = services(&storage);

        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        let outcome = progress
            .log_progress(book_id, LogProgressInput::at_page(150))
            .await
            .unwrap();

        assert_eq!(outcome.entry.current_page, 150);
        assert_eq!(outcome.entry.current_percentage, 42);
        assert_eq!(outcome.entry.pages_read, 150);
        assert!(!outcome.completion_reached);
    }

    #[tokio::test]
    async fn delta_is_relative_to_the_previous_entry() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        progress
            .log_progress(
                book_id,
                LogProgressInput::at_page(100).on(fixed_today() - chrono::Days::new(1)),
            )
            .await
            .unwrap();
        let outcome = progress
            .log_progress(book_id, LogProgressInput::at_page(150))
            .await
            .unwrap();

        assert_eq!(outcome.entry.pages_read, 50);
    }

    #[tokio::test]
    async fn percentage_input_derives_the_page() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        let outcome = progress
            .log_progress(book_id, LogProgressInput::at_percentage(50))
            .await
            .unwrap();
        assert_eq!(outcome.entry.current_page, 175);
        assert_eq!(outcome.entry.current_percentage, 50);
    }

    #[tokio::test]
    async fn page_only_input_without_total_records_zero_percent() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, None).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        let outcome = progress
            .log_progress(book_id, LogProgressInput::at_page(80))
            .await
            .unwrap();
        assert_eq!(outcome.entry.current_percentage, 0);
        assert!(!outcome.completion_reached);
    }

    #[tokio::test]
    async fn logging_without_a_session_starts_reading() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, _status) = services(&storage);

        let outcome = progress
            .log_progress(book_id, LogProgressInput::at_page(10))
            .await
            .unwrap();

        assert_eq!(outcome.session.status(), ReadingStatus::Reading);
        assert_eq!(outcome.session.session_number(), 1);
        assert_eq!(outcome.session.started_date(), Some(fixed_today()));
    }

    #[tokio::test]
    async fn ninety_nine_percent_never_completes_one_hundred_always_does() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(100)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        let at_99 = progress
            .log_progress(
                book_id,
                LogProgressInput::at_page(99).on(fixed_today() - chrono::Days::new(1)),
            )
            .await
            .unwrap();
        assert!(!at_99.completion_reached);
        assert_eq!(at_99.session.status(), ReadingStatus::Reading);

        let at_100 = progress
            .log_progress(book_id, LogProgressInput::at_page(100))
            .await
            .unwrap();
        assert!(at_100.completion_reached);
        assert_eq!(at_100.session.status(), ReadingStatus::Read);
        assert_eq!(at_100.session.completed_date(), Some(fixed_today()));
        assert!(!at_100.session.is_active());
    }

    #[tokio::test]
    async fn completion_does_not_fire_outside_reading() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(100)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::ToRead))
            .await
            .unwrap();

        let outcome = progress
            .log_progress(book_id, LogProgressInput::at_page(100))
            .await
            .unwrap();

        // The flag is still reported; the transition is not taken.
        assert!(outcome.completion_reached);
        assert_eq!(outcome.session.status(), ReadingStatus::ToRead);
    }

    #[tokio::test]
    async fn timeline_violation_writes_nothing() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        progress
            .log_progress(
                book_id,
                LogProgressInput::at_page(200).on(fixed_today() - chrono::Days::new(2)),
            )
            .await
            .unwrap();

        let err = progress
            .log_progress(book_id, LogProgressInput::at_page(150))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Timeline(TimelineConflict::BehindEarlierEntry { value: 200, .. })
        ));

        let session = storage
            .sessions
            .active_session(book_id)
            .await
            .unwrap()
            .unwrap();
        let entries = storage
            .entries
            .entries_for_session(session.id())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn retroactive_insert_rewrites_the_displaced_delta() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        progress
            .log_progress(
                book_id,
                LogProgressInput::at_page(50).on(fixed_today() - chrono::Days::new(4)),
            )
            .await
            .unwrap();
        progress
            .log_progress(book_id, LogProgressInput::at_page(200))
            .await
            .unwrap();

        // Backfill a forgotten day between the two.
        progress
            .log_progress(
                book_id,
                LogProgressInput::at_page(120).on(fixed_today() - chrono::Days::new(2)),
            )
            .await
            .unwrap();

        let session = storage
            .sessions
            .active_session(book_id)
            .await
            .unwrap()
            .unwrap();
        let entries = storage
            .entries
            .entries_for_session(session.id())
            .await
            .unwrap();
        assert_eq!(
            entries.iter().map(|e| e.current_page).collect::<Vec<_>>(),
            vec![50, 120, 200]
        );
        assert_eq!(
            entries.iter().map(|e| e.pages_read).collect::<Vec<_>>(),
            vec![50, 70, 80]
        );
    }

    #[tokio::test]
    async fn page_past_the_end_is_rejected() {
        let storage = Storage::in_memory();
        let book_id = seed_book(&storage, Some(350)).await;
        let (progress, status) = services(&storage);
        status
            .set_status(book_id, SetStatusInput::new(ReadingStatus::Reading))
            .await
            .unwrap();

        let err = progress
            .log_progress(book_id, LogProgressInput::at_page(351))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Progress(_)));
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let storage = Storage::in_memory();
        let (progress, _status) = services(&storage);

        let err = progress
            .log_progress(BookId::new(9), LogProgressInput::at_page(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::BookNotFound(id) if id == BookId::new(9)));
    }
}
