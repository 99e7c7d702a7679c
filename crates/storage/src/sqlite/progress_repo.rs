use shelf_core::model::{Book, BookId, ProgressLogEntry, ReadingSession, SessionId};

use super::{
    SqliteRepository,
    mapping::{entry_id_from_i64, id_i64, map_entry_row, ser, session_id_from_i64, user_id_to_i64},
};
use crate::repository::{
    LedgerPersistence, NewProgressEntry, NewSessionRecord, ProgressRepository, StorageError,
};

fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

async fn rewrite_derived_fields(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &ProgressLogEntry,
) -> Result<(), StorageError> {
    let res = sqlx::query(
        r"
            UPDATE progress_entries
            SET current_percentage = ?2, pages_read = ?3
            WHERE id = ?1
        ",
    )
    .bind(id_i64("entry_id", entry.id.value())?)
    .bind(i64::from(entry.current_percentage))
    .bind(i64::from(entry.pages_read))
    .execute(&mut **tx)
    .await
    .map_err(conn_err)?;

    if res.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn append_entry(
        &self,
        record: NewProgressEntry,
        rewrites: &[ProgressLogEntry],
    ) -> Result<ProgressLogEntry, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        let res = sqlx::query(
            r"
                INSERT INTO progress_entries (
                    book_id, session_id, user_id, current_page, current_percentage,
                    pages_read, progress_date, notes, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(id_i64("book_id", record.book_id.value())?)
        .bind(id_i64("session_id", record.session_id.value())?)
        .bind(user_id_to_i64(record.user_id)?)
        .bind(i64::from(record.current_page))
        .bind(i64::from(record.current_percentage))
        .bind(i64::from(record.pages_read))
        .bind(record.progress_date)
        .bind(record.notes.clone())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        for entry in rewrites {
            rewrite_derived_fields(&mut tx, entry).await?;
        }

        tx.commit().await.map_err(conn_err)?;

        let id = entry_id_from_i64(res.last_insert_rowid())?;
        Ok(record.into_entry(id))
    }

    async fn entries_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ProgressLogEntry>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, book_id, session_id, user_id, current_page, current_percentage,
                    pages_read, progress_date, notes, created_at
                FROM progress_entries
                WHERE session_id = ?1
                ORDER BY progress_date ASC, id ASC
            ",
        )
        .bind(id_i64("session_id", session_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_entry_row).collect()
    }

    async fn max_logged_page(&self, book_id: BookId) -> Result<Option<u32>, StorageError> {
        let row: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(current_page) FROM progress_entries WHERE book_id = ?1")
                .bind(id_i64("book_id", book_id.value())?)
                .fetch_one(&self.pool)
                .await
                .map_err(conn_err)?;

        row.0
            .map(|v| {
                u32::try_from(v)
                    .map_err(|_| StorageError::Serialization(format!("invalid current_page: {v}")))
            })
            .transpose()
    }
}

#[async_trait::async_trait]
impl LedgerPersistence for SqliteRepository {
    async fn archive_and_create(
        &self,
        archived: &ReadingSession,
        successor: NewSessionRecord,
    ) -> Result<ReadingSession, StorageError> {
        if archived.book_id() != successor.book_id {
            return Err(StorageError::Conflict);
        }

        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        // Flip the predecessor inactive first so the partial unique index
        // accepts the successor within the same transaction.
        let res = sqlx::query(
            r"
                UPDATE reading_sessions
                SET status = ?2, is_active = ?3, started_date = ?4,
                    completed_date = ?5, dnf_date = ?6, review = ?7
                WHERE id = ?1
            ",
        )
        .bind(id_i64("session_id", archived.id().value())?)
        .bind(archived.status().as_str())
        .bind(archived.is_active())
        .bind(archived.started_date())
        .bind(archived.completed_date())
        .bind(archived.dnf_date())
        .bind(archived.review().map(str::to_owned))
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        let res = sqlx::query(
            r"
                INSERT INTO reading_sessions (
                    book_id, user_id, session_number, status, is_active,
                    started_date, completed_date, dnf_date, review, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(id_i64("book_id", successor.book_id.value())?)
        .bind(user_id_to_i64(successor.user_id)?)
        .bind(i64::from(successor.session_number))
        .bind(successor.status.as_str())
        .bind(successor.is_active)
        .bind(successor.started_date)
        .bind(successor.completed_date)
        .bind(successor.dnf_date)
        .bind(successor.review.clone())
        .bind(successor.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            other => StorageError::Connection(other.to_string()),
        })?;

        tx.commit().await.map_err(conn_err)?;

        let id = session_id_from_i64(res.last_insert_rowid())?;
        successor.into_session(id).map_err(ser)
    }

    async fn apply_page_count_change(
        &self,
        book: &Book,
        rewritten: &[ProgressLogEntry],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

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
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        for entry in rewritten {
            rewrite_derived_fields(&mut tx, entry).await?;
        }

        tx.commit().await.map_err(conn_err)?;
        Ok(())
    }
}
