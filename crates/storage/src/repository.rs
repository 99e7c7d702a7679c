use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use shelf_core::model::{
    Book, BookError, BookId, EntryId, ProgressLogEntry, ReadingSession, ReadingStatus, SessionError,
    SessionId, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<BookError> for StorageError {
    fn from(err: BookError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<SessionError> for StorageError {
    fn from(err: SessionError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

//
// ─── INSERT RECORDS ────────────────────────────────────────────────────────────
//

/// Field set for inserting a book; the id comes back from storage.
#[derive(Debug, Clone)]
pub struct NewBookRecord {
    pub user_id: Option<UserId>,
    pub title: String,
    pub total_pages: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl NewBookRecord {
    /// Attach the storage-assigned id, producing the domain book.
    ///
    /// # Errors
    ///
    /// Returns `BookError` if the record fails domain validation.
    pub fn into_book(self, id: BookId) -> Result<Book, BookError> {
        Book::new(id, self.user_id, self.title, self.total_pages, self.created_at)
    }
}

/// Field set for inserting a reading session; the id comes back from storage.
#[derive(Debug, Clone)]
pub struct NewSessionRecord {
    pub book_id: BookId,
    pub user_id: Option<UserId>,
    pub session_number: u32,
    pub status: ReadingStatus,
    pub is_active: bool,
    pub started_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub dnf_date: Option<NaiveDate>,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewSessionRecord {
    /// A fresh active session with no dates stamped yet.
    #[must_use]
    pub fn fresh(
        book_id: BookId,
        user_id: Option<UserId>,
        session_number: u32,
        status: ReadingStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
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
        }
    }

    /// Attach the storage-assigned id, producing the domain session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the record fails domain validation.
    pub fn into_session(self, id: SessionId) -> Result<ReadingSession, SessionError> {
        ReadingSession::from_persisted(
            id,
            self.book_id,
            self.user_id,
            self.session_number,
            self.status,
            self.is_active,
            self.started_date,
            self.completed_date,
            self.dnf_date,
            self.review,
            self.created_at,
        )
    }
}

/// Field set for appending a progress entry; the id comes back from storage.
#[derive(Debug, Clone)]
pub struct NewProgressEntry {
    pub book_id: BookId,
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub current_page: u32,
    pub current_percentage: u8,
    pub pages_read: u32,
    pub progress_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewProgressEntry {
    /// Attach the storage-assigned id, producing the domain entry.
    #[must_use]
    pub fn into_entry(self, id: EntryId) -> ProgressLogEntry {
        ProgressLogEntry {
            id,
            book_id: self.book_id,
            session_id: self.session_id,
            user_id: self.user_id,
            current_page: self.current_page,
            current_percentage: self.current_percentage,
            pages_read: self.pages_read,
            progress_date: self.progress_date,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for books.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Insert a book and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the book cannot be stored.
    async fn insert_book(&self, record: NewBookRecord) -> Result<Book, StorageError>;

    /// Fetch a book by id, `None` if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_book(&self, id: BookId) -> Result<Option<Book>, StorageError>;

    /// List books in id order, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn list_books(&self, limit: u32) -> Result<Vec<Book>, StorageError>;

    /// Persist the mutable fields of an existing book.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the book does not exist.
    async fn update_book(&self, book: &Book) -> Result<(), StorageError>;
}

/// Repository contract for reading sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the book already has an active
    /// session and the record claims to be active.
    async fn insert_session(&self, record: NewSessionRecord)
        -> Result<ReadingSession, StorageError>;

    /// Fetch a session by id, `None` if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<ReadingSession>, StorageError>;

    /// The book's single active session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn active_session(&self, book_id: BookId)
        -> Result<Option<ReadingSession>, StorageError>;

    /// All sessions of a book, ordered by session number.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn sessions_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReadingSession>, StorageError>;

    /// Highest session number used for a book, `None` if the book has none.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn max_session_number(&self, book_id: BookId) -> Result<Option<u32>, StorageError>;

    /// Persist the mutable fields of an existing session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn update_session(&self, session: &ReadingSession) -> Result<(), StorageError>;
}

/// Repository contract for the progress ledger.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Append an entry and, in the same transaction, rewrite the derived
    /// fields of any chronological successors the insert displaced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any write fails; nothing is applied then.
    async fn append_entry(
        &self,
        record: NewProgressEntry,
        rewrites: &[ProgressLogEntry],
    ) -> Result<ProgressLogEntry, StorageError>;

    /// A session's ledger in chronological order (date, then insertion).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn entries_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ProgressLogEntry>, StorageError>;

    /// The highest page ever logged against a book, across all its sessions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn max_logged_page(&self, book_id: BookId) -> Result<Option<u32>, StorageError>;
}

/// Multi-write operations that must commit atomically.
///
/// These are the transaction boundaries the ledger's invariants lean on: a
/// reader must never observe two active sessions, or a new page count next to
/// stale percentages.
#[async_trait]
pub trait LedgerPersistence: Send + Sync {
    /// Archive `archived` and insert its successor in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if either write fails; neither is applied then.
    async fn archive_and_create(
        &self,
        archived: &ReadingSession,
        successor: NewSessionRecord,
    ) -> Result<ReadingSession, StorageError>;

    /// Persist a book's new page count together with every rewritten ledger
    /// entry, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any write fails; neither the book nor any
    /// entry is changed then.
    async fn apply_page_count_change(
        &self,
        book: &Book,
        rewritten: &[ProgressLogEntry],
    ) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    books: HashMap<BookId, Book>,
    sessions: HashMap<SessionId, ReadingSession>,
    entries: HashMap<EntryId, ProgressLogEntry>,
    next_book_id: u64,
    next_session_id: u64,
    next_entry_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl BookRepository for InMemoryRepository {
    async fn insert_book(&self, record: NewBookRecord) -> Result<Book, StorageError> {
        let mut state = self.lock()?;
        state.next_book_id += 1;
        let book = record.into_book(BookId::new(state.next_book_id))?;
        state.books.insert(book.id(), book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: BookId) -> Result<Option<Book>, StorageError> {
        Ok(self.lock()?.books.get(&id).cloned())
    }

    async fn list_books(&self, limit: u32) -> Result<Vec<Book>, StorageError> {
        let state = self.lock()?;
        let mut books: Vec<Book> = state.books.values().cloned().collect();
        books.sort_by_key(Book::id);
        books.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(books)
    }

    async fn update_book(&self, book: &Book) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if !state.books.contains_key(&book.id()) {
            return Err(StorageError::NotFound);
        }
        state.books.insert(book.id(), book.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(
        &self,
        record: NewSessionRecord,
    ) -> Result<ReadingSession, StorageError> {
        let mut state = self.lock()?;
        if record.is_active
            && state
                .sessions
                .values()
                .any(|s| s.book_id() == record.book_id && s.is_active())
        {
            return Err(StorageError::Conflict);
        }
        state.next_session_id += 1;
        let session = record.into_session(SessionId::new(state.next_session_id))?;
        state.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<ReadingSession>, StorageError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn active_session(
        &self,
        book_id: BookId,
    ) -> Result<Option<ReadingSession>, StorageError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .find(|s| s.book_id() == book_id && s.is_active())
            .cloned())
    }

    async fn sessions_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReadingSession>, StorageError> {
        let state = self.lock()?;
        let mut sessions: Vec<ReadingSession> = state
            .sessions
            .values()
            .filter(|s| s.book_id() == book_id)
            .cloned()
            .collect();
        sessions.sort_by_key(ReadingSession::session_number);
        Ok(sessions)
    }

    async fn max_session_number(&self, book_id: BookId) -> Result<Option<u32>, StorageError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.book_id() == book_id)
            .map(ReadingSession::session_number)
            .max())
    }

    async fn update_session(&self, session: &ReadingSession) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if !state.sessions.contains_key(&session.id()) {
            return Err(StorageError::NotFound);
        }
        state.sessions.insert(session.id(), session.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn append_entry(
        &self,
        record: NewProgressEntry,
        rewrites: &[ProgressLogEntry],
    ) -> Result<ProgressLogEntry, StorageError> {
        let mut state = self.lock()?;
        if !state.sessions.contains_key(&record.session_id) {
            return Err(StorageError::NotFound);
        }
        if rewrites.iter().any(|r| !state.entries.contains_key(&r.id)) {
            return Err(StorageError::NotFound);
        }
        state.next_entry_id += 1;
        let entry = record.into_entry(EntryId::new(state.next_entry_id));
        state.entries.insert(entry.id, entry.clone());
        for rewrite in rewrites {
            state.entries.insert(rewrite.id, rewrite.clone());
        }
        Ok(entry)
    }

    async fn entries_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ProgressLogEntry>, StorageError> {
        let state = self.lock()?;
        let mut entries: Vec<ProgressLogEntry> = state
            .entries
            .values()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        entries.sort_by_key(ProgressLogEntry::chrono_key);
        Ok(entries)
    }

    async fn max_logged_page(&self, book_id: BookId) -> Result<Option<u32>, StorageError> {
        Ok(self
            .lock()?
            .entries
            .values()
            .filter(|e| e.book_id == book_id)
            .map(|e| e.current_page)
            .max())
    }
}

#[async_trait]
impl LedgerPersistence for InMemoryRepository {
    async fn archive_and_create(
        &self,
        archived: &ReadingSession,
        successor: NewSessionRecord,
    ) -> Result<ReadingSession, StorageError> {
        let mut state = self.lock()?;
        if !state.sessions.contains_key(&archived.id()) {
            return Err(StorageError::NotFound);
        }
        state.sessions.insert(archived.id(), archived.clone());
        state.next_session_id += 1;
        let session = successor.into_session(SessionId::new(state.next_session_id))?;
        state.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    async fn apply_page_count_change(
        &self,
        book: &Book,
        rewritten: &[ProgressLogEntry],
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if !state.books.contains_key(&book.id()) {
            return Err(StorageError::NotFound);
        }
        for entry in rewritten {
            if !state.entries.contains_key(&entry.id) {
                return Err(StorageError::NotFound);
            }
        }
        state.books.insert(book.id(), book.clone());
        for entry in rewritten {
            state.entries.insert(entry.id, entry.clone());
        }
        Ok(())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub books: Arc<dyn BookRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub entries: Arc<dyn ProgressRepository>,
    pub ledger: Arc<dyn LedgerPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let books: Arc<dyn BookRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let entries: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let ledger: Arc<dyn LedgerPersistence> = Arc::new(repo);
        Self {
            books,
            sessions,
            entries,
            ledger,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
