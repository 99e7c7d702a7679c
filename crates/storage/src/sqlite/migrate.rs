use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (books, reading sessions with the single-active
/// guarantee, progress entries, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS books (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER,
                    title TEXT NOT NULL,
                    total_pages INTEGER CHECK (total_pages IS NULL OR total_pages >= 1),
                    rating INTEGER CHECK (rating IS NULL OR rating BETWEEN 1 AND 5),
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS reading_sessions (
                    id INTEGER PRIMARY KEY,
                    book_id INTEGER NOT NULL,
                    user_id INTEGER,
                    session_number INTEGER NOT NULL CHECK (session_number >= 1),
                    status TEXT NOT NULL,
                    is_active INTEGER NOT NULL CHECK (is_active IN (0, 1)),
                    started_date TEXT,
                    completed_date TEXT,
                    dnf_date TEXT,
                    review TEXT,
                    created_at TEXT NOT NULL,
                    UNIQUE (book_id, session_number),
                    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // At most one active session per book, enforced in the schema itself.
        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_reading_sessions_single_active
                    ON reading_sessions (book_id) WHERE is_active = 1;
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress_entries (
                    id INTEGER PRIMARY KEY,
                    book_id INTEGER NOT NULL,
                    session_id INTEGER NOT NULL,
                    user_id INTEGER,
                    current_page INTEGER NOT NULL CHECK (current_page >= 0),
                    current_percentage INTEGER NOT NULL
                        CHECK (current_percentage BETWEEN 0 AND 100),
                    pages_read INTEGER NOT NULL CHECK (pages_read >= 0),
                    progress_date TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                    FOREIGN KEY (session_id) REFERENCES reading_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_reading_sessions_book_number
                    ON reading_sessions (book_id, session_number);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_entries_session_date
                    ON progress_entries (session_id, progress_date, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_entries_book_page
                    ON progress_entries (book_id, current_page);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
