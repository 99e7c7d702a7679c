use sqlx::Row;

use shelf_core::model::{
    Book, BookId, EntryId, ProgressLogEntry, ReadingSession, ReadingStatus, SessionId, UserId,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn book_id_from_i64(v: i64) -> Result<BookId, StorageError> {
    Ok(BookId::new(i64_to_u64("book_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn entry_id_from_i64(v: i64) -> Result<EntryId, StorageError> {
    Ok(EntryId::new(i64_to_u64("entry_id", v)?))
}

pub(crate) fn user_id_from_i64(v: Option<i64>) -> Result<Option<UserId>, StorageError> {
    v.map(|raw| Ok(UserId::new(i64_to_u64("user_id", raw)?)))
        .transpose()
}

pub(crate) fn user_id_to_i64(uid: Option<UserId>) -> Result<Option<i64>, StorageError> {
    uid.map(|u| id_i64("user_id", u.value())).transpose()
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn percentage_from_i64(v: i64) -> Result<u8, StorageError> {
    let pct = u8::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("invalid current_percentage: {v}")))?;
    if pct > 100 {
        return Err(StorageError::Serialization(format!(
            "invalid current_percentage: {v}"
        )));
    }
    Ok(pct)
}

/// Stored statuses use the same kebab-case encoding as the wire form.
pub(crate) fn status_from_str(s: &str) -> Result<ReadingStatus, StorageError> {
    ReadingStatus::parse(s).map_err(ser)
}

pub(crate) fn map_book_row(row: &sqlx::sqlite::SqliteRow) -> Result<Book, StorageError> {
    let total_pages = row
        .try_get::<Option<i64>, _>("total_pages")
        .map_err(ser)?
        .map(|v| u32_from_i64("total_pages", v))
        .transpose()?;
    let rating = row
        .try_get::<Option<i64>, _>("rating")
        .map_err(ser)?
        .map(|v| {
            u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid rating: {v}")))
        })
        .transpose()?;

    Book::from_persisted(
        book_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<Option<i64>, _>("user_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        total_pages,
        rating,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ReadingSession, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let session_number = u32_from_i64(
        "session_number",
        row.try_get::<i64, _>("session_number").map_err(ser)?,
    )?;

    ReadingSession::from_persisted(
        session_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        book_id_from_i64(row.try_get::<i64, _>("book_id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<Option<i64>, _>("user_id").map_err(ser)?)?,
        session_number,
        status_from_str(status_str.as_str())?,
        row.try_get::<bool, _>("is_active").map_err(ser)?,
        row.try_get("started_date").map_err(ser)?,
        row.try_get("completed_date").map_err(ser)?,
        row.try_get("dnf_date").map_err(ser)?,
        row.try_get("review").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_entry_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ProgressLogEntry, StorageError> {
    Ok(ProgressLogEntry {
        id: entry_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        book_id: book_id_from_i64(row.try_get::<i64, _>("book_id").map_err(ser)?)?,
        session_id: session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get::<Option<i64>, _>("user_id").map_err(ser)?)?,
        current_page: u32_from_i64(
            "current_page",
            row.try_get::<i64, _>("current_page").map_err(ser)?,
        )?,
        current_percentage: percentage_from_i64(
            row.try_get::<i64, _>("current_percentage").map_err(ser)?,
        )?,
        pages_read: u32_from_i64("pages_read", row.try_get::<i64, _>("pages_read").map_err(ser)?)?,
        progress_date: row.try_get("progress_date").map_err(ser)?,
        notes: row.try_get("notes").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
