use shelf_core::model::{BookId, ReadingSession, SessionId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_session_row, ser, session_id_from_i64, user_id_to_i64},
};
use crate::repository::{NewSessionRecord, SessionRepository, StorageError};

const SESSION_COLUMNS: &str = "id, book_id, user_id, session_number, status, is_active, \
     started_date, completed_date, dnf_date, review, created_at";

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(
        &self,
        record: NewSessionRecord,
    ) -> Result<ReadingSession, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO reading_sessions (
                    book_id, user_id, session_number, status, is_active,
                    started_date, completed_date, dnf_date, review, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(id_i64("book_id", record.book_id.value())?)
        .bind(user_id_to_i64(record.user_id)?)
        .bind(i64::from(record.session_number))
        .bind(record.status.as_str())
        .bind(record.is_active)
        .bind(record.started_date)
        .bind(record.completed_date)
        .bind(record.dnf_date)
        .bind(record.review.clone())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            // The partial unique index trips when a second active session
            // would appear for the book.
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            other => StorageError::Connection(other.to_string()),
        })?;

        let id = session_id_from_i64(res.last_insert_rowid())?;
        record.into_session(id).map_err(ser)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<ReadingSession>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM reading_sessions WHERE id = ?1"
        ))
        .bind(id_i64("session_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn active_session(
        &self,
        book_id: BookId,
    ) -> Result<Option<ReadingSession>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM reading_sessions WHERE book_id = ?1 AND is_active = 1"
        ))
        .bind(id_i64("book_id", book_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn sessions_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReadingSession>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM reading_sessions \
             WHERE book_id = ?1 ORDER BY session_number ASC"
        ))
        .bind(id_i64("book_id", book_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_session_row).collect()
    }

    async fn max_session_number(&self, book_id: BookId) -> Result<Option<u32>, StorageError> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(session_number) FROM reading_sessions WHERE book_id = ?1",
        )
        .bind(id_i64("book_id", book_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.0
            .map(|v| {
                u32::try_from(v).map_err(|_| {
                    StorageError::Serialization(format!("invalid session_number: {v}"))
                })
            })
            .transpose()
    }

    async fn update_session(&self, session: &ReadingSession) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE reading_sessions
                SET status = ?2, is_active = ?3, started_date = ?4,
                    completed_date = ?5, dnf_date = ?6, review = ?7
                WHERE id = ?1
            ",
        )
        .bind(id_i64("session_id", session.id().value())?)
        .bind(session.status().as_str())
        .bind(session.is_active())
        .bind(session.started_date())
        .bind(session.completed_date())
        .bind(session.dnf_date())
        .bind(session.review().map(str::to_owned))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
