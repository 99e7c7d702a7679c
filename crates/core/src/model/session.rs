use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{BookId, SessionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors that can occur while building or mutating a reading session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("unknown reading status: {0}")]
    UnknownStatus(String),

    #[error("session numbers start at 1")]
    InvalidSessionNumber,
}

//
// ─── READING STATUS ────────────────────────────────────────────────────────────
//

/// Workflow stage of one attempt at reading a book.
///
/// The set is closed; anything else coming over the wire is rejected at the
/// boundary with `SessionError::UnknownStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingStatus {
    /// On the shelf, not queued.
    ToRead,
    /// Queued up to read soon.
    ReadNext,
    /// Currently being read; the only status progress auto-completion fires from.
    Reading,
    /// Finished.
    Read,
    /// Abandoned (did not finish).
    Dnf,
}

impl ReadingStatus {
    /// Parses the kebab-case wire form used by callers and storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownStatus` for anything outside the closed set.
    pub fn parse(value: &str) -> Result<Self, SessionError> {
        match value {
            "to-read" => Ok(Self::ToRead),
            "read-next" => Ok(Self::ReadNext),
            "reading" => Ok(Self::Reading),
            "read" => Ok(Self::Read),
            "dnf" => Ok(Self::Dnf),
            other => Err(SessionError::UnknownStatus(other.to_string())),
        }
    }

    /// The kebab-case wire form, also used as the storage encoding.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToRead => "to-read",
            Self::ReadNext => "read-next",
            Self::Reading => "reading",
            Self::Read => "read",
            Self::Dnf => "dnf",
        }
    }

    /// True when switching to `target` walks the workflow backwards from
    /// `reading` to an earlier stage.
    ///
    /// Once progress exists, such a move archives the session instead of
    /// rewriting it, so the history of the abandoned attempt survives.
    #[must_use]
    pub fn is_backward_move(self, target: ReadingStatus) -> bool {
        self == Self::Reading && matches!(target, Self::ToRead | Self::ReadNext)
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── READING SESSION ───────────────────────────────────────────────────────────
//

/// One attempt at reading a book, with its own status and progress history.
///
/// A book has at most one active session; finished, abandoned, and
/// superseded sessions stick around as archived history and are never
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingSession {
    id: SessionId,
    book_id: BookId,
    user_id: Option<UserId>,
    session_number: u32,
    status: ReadingStatus,
    is_active: bool,
    started_date: Option<NaiveDate>,
    completed_date: Option<NaiveDate>,
    dnf_date: Option<NaiveDate>,
    review: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReadingSession {
    /// Create a fresh, active session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSessionNumber` if `session_number` is 0.
    pub fn new(
        id: SessionId,
        book_id: BookId,
        user_id: Option<UserId>,
        session_number: u32,
        status: ReadingStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if session_number == 0 {
            return Err(SessionError::InvalidSessionNumber);
        }

        Ok(Self {
            id,
            book_id,
            user_id,
            session_number,
            status,
            is_active: true,
            started_date: None,
            completed_date: None,
            dnf_date: None,
            review: None,
            created_at,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSessionNumber` if `session_number` is 0.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        book_id: BookId,
        user_id: Option<UserId>,
        session_number: u32,
        status: ReadingStatus,
        is_active: bool,
        started_date: Option<NaiveDate>,
        completed_date: Option<NaiveDate>,
        dnf_date: Option<NaiveDate>,
        review: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if session_number == 0 {
            return Err(SessionError::InvalidSessionNumber);
        }

        Ok(Self {
            id,
            book_id,
            user_id,
            session_number,
            status,
            is_active,
            started_date,
            completed_date,
            dnf_date,
            review,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    #[must_use]
    pub fn status(&self) -> ReadingStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn started_date(&self) -> Option<NaiveDate> {
        self.started_date
    }

    #[must_use]
    pub fn completed_date(&self) -> Option<NaiveDate> {
        self.completed_date
    }

    #[must_use]
    pub fn dnf_date(&self) -> Option<NaiveDate> {
        self.dnf_date
    }

    #[must_use]
    pub fn review(&self) -> Option<&str> {
        self.review.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Apply a user-requested status to this session in place.
    ///
    /// - Entering `reading` stamps `started_date` (explicit input or `today`)
    ///   if it is still unset.
    /// - Entering `read` stamps `completed_date` (explicit input or `today`),
    ///   backfills `started_date`, and archives the session.
    /// - Entering `dnf` stamps `dnf_date` and archives the session.
    ///
    /// Backward-movement archival is a separate concern: callers must check
    /// `ReadingStatus::is_backward_move` (plus the ledger) *before* calling
    /// this, because that path spawns a successor instead of mutating.
    pub fn apply_status(
        &mut self,
        new_status: ReadingStatus,
        started_date: Option<NaiveDate>,
        completed_date: Option<NaiveDate>,
        today: NaiveDate,
    ) {
        match new_status {
            ReadingStatus::Reading => {
                if self.started_date.is_none() {
                    self.started_date = Some(started_date.unwrap_or(today));
                }
            }
            ReadingStatus::Read => {
                let completed = completed_date.unwrap_or(today);
                self.completed_date = Some(completed);
                if self.started_date.is_none() {
                    self.started_date = Some(started_date.unwrap_or(completed));
                }
                self.is_active = false;
            }
            ReadingStatus::Dnf => {
                self.dnf_date = Some(today);
                self.is_active = false;
            }
            ReadingStatus::ToRead | ReadingStatus::ReadNext => {}
        }
        self.status = new_status;
    }

    /// Finish the session from the ledger side: the 100% entry's date becomes
    /// the completion date.
    pub fn finish(&mut self, completed_date: NaiveDate) {
        self.status = ReadingStatus::Read;
        self.completed_date = Some(completed_date);
        if self.started_date.is_none() {
            self.started_date = Some(completed_date);
        }
        self.is_active = false;
    }

    /// Archive this session as-is, keeping its status as history.
    ///
    /// Used by backward movement, where the `reading` attempt is frozen and a
    /// successor session takes over.
    pub fn archive(&mut self) {
        self.is_active = false;
    }

    pub fn set_review(&mut self, review: impl Into<String>) {
        self.review = Some(review.into());
    }

    /// True when a just-logged percentage should auto-finish this session.
    ///
    /// Only a session currently in `reading` is eligible; a session already
    /// marked `read` (or anything else) never transitions automatically.
    #[must_use]
    pub fn completion_due(&self, percentage: u8) -> bool {
        self.status == ReadingStatus::Reading && percentage >= 100
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
