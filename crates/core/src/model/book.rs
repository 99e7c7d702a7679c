use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{BookId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BookError {
    #[error("book title cannot be empty")]
    EmptyTitle,

    #[error("total pages must be at least 1")]
    InvalidTotalPages,

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
}

//
// ─── BOOK ──────────────────────────────────────────────────────────────────────
//

/// A book being tracked, with the page count and rating the ledger cares about.
///
/// The page count is nullable because many imported books arrive without one;
/// progress logged against such a book records pages but a zero percentage
/// until the count is filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    id: BookId,
    user_id: Option<UserId>,
    title: String,
    total_pages: Option<u32>,
    rating: Option<u8>,
    created_at: DateTime<Utc>,
}

impl Book {
    /// Create a new book.
    ///
    /// # Errors
    ///
    /// Returns `BookError::EmptyTitle` if the title is blank and
    /// `BookError::InvalidTotalPages` if a zero page count is given.
    pub fn new(
        id: BookId,
        user_id: Option<UserId>,
        title: impl Into<String>,
        total_pages: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BookError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(BookError::EmptyTitle);
        }
        if total_pages == Some(0) {
            return Err(BookError::InvalidTotalPages);
        }

        Ok(Self {
            id,
            user_id,
            title,
            total_pages,
            rating: None,
            created_at,
        })
    }

    /// Rehydrate a book from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `BookError` if a stored field is out of range.
    pub fn from_persisted(
        id: BookId,
        user_id: Option<UserId>,
        title: String,
        total_pages: Option<u32>,
        rating: Option<u8>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BookError> {
        let mut book = Self::new(id, user_id, title, total_pages, created_at)?;
        if let Some(r) = rating {
            book.set_rating(Some(r))?;
        }
        Ok(book)
    }

    #[must_use]
    pub fn id(&self) -> BookId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    #[must_use]
    pub fn rating(&self) -> Option<u8> {
        self.rating
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set or clear the 1-5 star rating.
    ///
    /// The rating lives on the book, not on any single reading session, so a
    /// re-read updates the same value external catalogs see.
    ///
    /// # Errors
    ///
    /// Returns `BookError::InvalidRating` for values outside 1..=5.
    pub fn set_rating(&mut self, rating: Option<u8>) -> Result<(), BookError> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(BookError::InvalidRating(r));
            }
        }
        self.rating = rating;
        Ok(())
    }

    /// Set the total page count.
    ///
    /// Only local validation happens here; the cross-entity rule that a count
    /// may not drop below already-logged progress is enforced by the
    /// page-count service, which can see the book's ledger.
    ///
    /// # Errors
    ///
    /// Returns `BookError::InvalidTotalPages` for a zero count.
    pub fn set_total_pages(&mut self, total_pages: u32) -> Result<(), BookError> {
        if total_pages == 0 {
            return Err(BookError::InvalidTotalPages);
        }
        self.total_pages = Some(total_pages);
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn new_book_rejects_empty_title() {
        let err = Book::new(BookId::new(1), None, "   ", Some(300), fixed_now()).unwrap_err();
        assert!(matches!(err, BookError::EmptyTitle));
    }

    #[test]
    fn new_book_rejects_zero_pages() {
        let err = Book::new(BookId::new(1), None, "Dune", Some(0), fixed_now()).unwrap_err();
        assert!(matches!(err, BookError::InvalidTotalPages));
    }

    #[test]
    fn rating_is_bounded() {
        let mut book = Book::new(BookId::new(1), None, "Dune", Some(600), fixed_now()).unwrap();
        book.set_rating(Some(5)).unwrap();
        assert_eq!(book.rating(), Some(5));

        let err = book.set_rating(Some(6)).unwrap_err();
        assert!(matches!(err, BookError::InvalidRating(6)));
        assert_eq!(book.rating(), Some(5));

        book.set_rating(None).unwrap();
        assert_eq!(book.rating(), None);
    }

    #[test]
    fn persisted_roundtrip_keeps_rating() {
        let book = Book::from_persisted(
            BookId::new(2),
            Some(crate::model::UserId::new(1)),
            "Dune".to_string(),
            None,
            Some(4),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(book.rating(), Some(4));
        assert_eq!(book.total_pages(), None);
    }
}
