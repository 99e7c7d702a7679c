#![forbid(unsafe_code)]

pub mod app_services;
pub mod book_service;
pub mod error;
pub mod page_count_service;
pub mod progress_service;
pub mod status_service;

pub use shelf_core::Clock;

pub use app_services::AppServices;
pub use book_service::{BookOverview, BookService};
pub use error::{AppServicesError, BookServiceError, LedgerError, PageCountError, StatusError};
pub use page_count_service::PageCountService;
pub use progress_service::{LogProgressInput, ProgressOutcome, ProgressService};
pub use status_service::{ArchivedSession, SetStatusInput, StatusOutcome, StatusService};
