mod book;
mod ids;
mod progress;
mod session;

pub use ids::{BookId, EntryId, ParseIdError, SessionId, UserId};

pub use book::{Book, BookError};
pub use progress::{
    page_at, pages_read, percentage_of, recompute, recompute_deltas, ProgressError,
    ProgressLogEntry, ProgressMeasure, ProgressUnit, ResolvedProgress,
};
pub use session::{ReadingSession, ReadingStatus, SessionError};
