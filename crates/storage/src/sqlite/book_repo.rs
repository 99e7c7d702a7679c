use shelf_core::model::{Book, BookId};

use super::{
    SqliteRepository,
    mapping::{book_id_from_i64, id_i64, map_book_row, ser, user_id_to_i64},
};
use crate::repository::{BookRepository, NewBookRecord, StorageError};

#[async_trait::async_trait]
impl BookRepository for SqliteRepository {
    async fn insert_book(&self, record: NewBookRecord) -> Result<Book, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO books (user_id, title, total_pages, rating, created_at)
                VALUES (?1, ?2, ?3, NULL, ?4)
            ",
        )
        .bind(user_id_to_i64(record.user_id)?)
        .bind(record.title.clone())
        .bind(record.total_pages.map(i64::from))
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let id = book_id_from_i64(res.last_insert_rowid())?;
        record.into_book(id).map_err(ser)
    }

    async fn get_book(&self, id: BookId) -> Result<Option<Book>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, user_id, title, total_pages, rating, created_at
                FROM books
                WHERE id = ?1
            ",
        )
        .bind(id_i64("book_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_book_row).transpose()
    }

    async fn list_books(&self, limit: u32) -> Result<Vec<Book>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, title, total_pages, rating, created_at
                FROM books
                ORDER BY id ASC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_book_row).collect()
    }

    async fn update_book(&self, book: &Book) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE books
                SET title = ?2, total_pages = ?3, rating = ?4
                WHERE id = ?1
            ",
        )
        .bind(id_i64("book_id", book.id().value())?)
        .bind(book.title().to_owned())
        .bind(book.total_pages().map(i64::from))
        .bind(book.rating().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
