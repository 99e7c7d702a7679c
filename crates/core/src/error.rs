use thiserror::Error;

use crate::model::{BookError, ProgressError, SessionError};
use crate::timeline::TimelineConflict;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Timeline(#[from] TimelineConflict),
}
