use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

use shelf_core::{
    model::{BookId, ReadingSession, ReadingStatus, SessionId, UserId},
    time::Clock,
};
use storage::repository::{
    BookRepository, LedgerPersistence, NewSessionRecord, ProgressRepository, SessionRepository,
};

use crate::error::StatusError;

//
// ─── INPUTS & OUTCOMES ─────────────────────────────────────────────────────────
//

/// A user-requested status change, with the optional extras that ride along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStatusInput {
    pub status: ReadingStatus,
    pub rating: Option<u8>,
    pub review: Option<String>,
    pub started_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
}

impl SetStatusInput {
    #[must_use]
    pub fn new(status: ReadingStatus) -> Self {
        Self {
            status,
            rating: None,
            review: None,
            started_date: None,
            completed_date: None,
        }
    }
}

/// The predecessor frozen by a backward movement.
///
/// Callers use this to trigger dependent recalculations (streaks, goals)
/// that live outside the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivedSession {
    pub session_id: SessionId,
    pub session_number: u32,
}

/// Result of a status change: the session now driving the book, plus the
/// archived predecessor when backward movement spawned a successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub session: ReadingSession,
    pub archived: Option<ArchivedSession>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Owns the reading-session lifecycle: creation, status transitions,
/// backward-movement archival, and completion archival.
pub struct StatusService {
    clock: Clock,
    books: Arc<dyn BookRepository>,
    sessions: Arc<dyn SessionRepository>,
    entries: Arc<dyn ProgressRepository>,
    ledger: Arc<dyn LedgerPersistence>,
}

impl StatusService {
    #[must_use]
    pub fn new(
        clock: Clock,
        books: Arc<dyn BookRepository>,
        sessions: Arc<dyn SessionRepository>,
        entries: Arc<dyn ProgressRepository>,
        ledger: Arc<dyn LedgerPersistence>,
    ) -> Self {
        Self {
            clock,
            books,
            sessions,
            entries,
            ledger,
        }
    }

    /// Apply a status change to a book's active session, creating or
    /// archiving sessions as the workflow requires.
    ///
    /// Moving backwards out of `reading` once progress exists freezes the
    /// current session as history and spawns a successor; every other change
    /// lands on the active session in place (or creates the book's next
    /// session when none is active).
    ///
    /// # Errors
    ///
    /// Returns `StatusError::BookNotFound` for an unknown book, rating
    /// validation errors, and storage failures. Nothing is mutated on error.
    pub async fn set_status(
        &self,
        book_id: BookId,
        input: SetStatusInput,
    ) -> Result<StatusOutcome, StatusError> {
        let mut book = self
            .books
            .get_book(book_id)
            .await?
            .ok_or(StatusError::BookNotFound(book_id))?;

        // Validate the rating before touching any session state, so a bad
        // rating cannot leave a half-applied change behind.
        if let Some(rating) = input.rating {
            book.set_rating(Some(rating))?;
        }

        let today = self.clock.today();
        let now = self.clock.now();
        let active = self.sessions.active_session(book_id).await?;

        // Backward movement only archives once the attempt has history; an
        // empty ledger means the status can simply be rewound in place.
        let archive_required = match &active {
            Some(session) if session.status().is_backward_move(input.status) => !self
                .entries
                .entries_for_session(session.id())
                .await?
                .is_empty(),
            _ => false,
        };

        let (mut session, archived) = match active {
            Some(active) if archive_required => {
                self.archive_with_successor(book.user_id(), active, input.status, now)
                    .await?
            }
            Some(active) => (active, None),
            None => {
                let number = self
                    .sessions
                    .max_session_number(book_id)
                    .await?
                    .map_or(1, |n| n + 1);
                let session = self
                    .sessions
                    .insert_session(NewSessionRecord::fresh(
                        book_id,
                        book.user_id(),
                        number,
                        input.status,
                        now,
                    ))
                    .await?;
                (session, None)
            }
        };

        session.apply_status(input.status, input.started_date, input.completed_date, today);
        if let Some(review) = input.review {
            session.set_review(review);
        }
        self.sessions.update_session(&session).await?;

        // The rating lives on the book; persist it last since it cannot fail
        // validation anymore, and best-effort consumers (catalog sync) read
        // from the book row.
        if input.rating.is_some() {
            self.books.update_book(&book).await?;
        }

        info!(
            book_id = %book_id,
            session = session.session_number(),
            status = %session.status(),
            "status changed"
        );

        Ok(StatusOutcome { session, archived })
    }

    /// Finish a session because its ledger reached 100%.
    ///
    /// Ledger-driven counterpart of the `read` branch of `set_status`; the
    /// triggering entry's date becomes the completion date.
    ///
    /// # Errors
    ///
    /// Returns `StatusError::SessionNotFound` for an unknown session, or
    /// storage failures.
    pub async fn complete_session(
        &self,
        session_id: SessionId,
        completed_date: NaiveDate,
    ) -> Result<ReadingSession, StatusError> {
        let mut session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(StatusError::SessionNotFound(session_id))?;

        session.finish(completed_date);
        self.sessions.update_session(&session).await?;

        info!(
            book_id = %session.book_id(),
            session = session.session_number(),
            "session completed at 100%"
        );

        Ok(session)
    }

    async fn archive_with_successor(
        &self,
        user_id: Option<UserId>,
        mut active: ReadingSession,
        new_status: ReadingStatus,
        now: DateTime<Utc>,
    ) -> Result<(ReadingSession, Option<ArchivedSession>), StatusError> {
        let archived_ref = ArchivedSession {
            session_id: active.id(),
            session_number: active.session_number(),
        };
        let successor = NewSessionRecord::fresh(
            active.book_id(),
            user_id,
            active.session_number() + 1,
            new_status,
            now,
        );

        active.archive();
        let session = self.ledger.archive_and_create(&active, successor).await?;

        info!(
            book_id = %session.book_id(),
            archived = archived_ref.session_number,
            successor = session.session_number(),
            "backward movement archived session"
        );

        Ok((session, Some(archived_ref)))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
