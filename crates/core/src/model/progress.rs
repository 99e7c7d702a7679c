use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{BookId, EntryId, SessionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Validation errors for a progress submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("either a page number or a percentage is required")]
    MissingMeasure,

    #[error("provide a page number or a percentage, not both")]
    ConflictingMeasures,

    #[error("percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(u32),

    #[error("page {page} is past the end of a {total}-page book")]
    PagePastEnd { page: u32, total: u32 },
}

//
// ─── MEASURES ──────────────────────────────────────────────────────────────────
//

/// Which axis a progress value is expressed on.
///
/// The timeline validator compares candidates against existing entries on the
/// same axis the caller supplied, so a percentage submission is never checked
/// against page numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Pages,
    Percent,
}

impl fmt::Display for ProgressUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pages => f.write_str("pages"),
            Self::Percent => f.write_str("percent"),
        }
    }
}

/// A validated progress measurement: exactly one of page or percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMeasure {
    Page(u32),
    Percent(u8),
}

impl ProgressMeasure {
    /// Validate a raw submission into a single measure.
    ///
    /// # Errors
    ///
    /// Rejects a submission carrying both measures, neither, or a percentage
    /// outside 0..=100.
    pub fn from_input(page: Option<u32>, percentage: Option<u32>) -> Result<Self, ProgressError> {
        match (page, percentage) {
            (Some(_), Some(_)) => Err(ProgressError::ConflictingMeasures),
            (None, None) => Err(ProgressError::MissingMeasure),
            (Some(p), None) => Ok(Self::Page(p)),
            (None, Some(pct)) => {
                let pct =
                    u8::try_from(pct).map_err(|_| ProgressError::PercentageOutOfRange(pct))?;
                if pct > 100 {
                    return Err(ProgressError::PercentageOutOfRange(u32::from(pct)));
                }
                Ok(Self::Percent(pct))
            }
        }
    }

    #[must_use]
    pub fn unit(self) -> ProgressUnit {
        match self {
            Self::Page(_) => ProgressUnit::Pages,
            Self::Percent(_) => ProgressUnit::Percent,
        }
    }

    /// The raw value on this measure's own axis.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            Self::Page(p) => p,
            Self::Percent(pct) => u32::from(pct),
        }
    }

    /// Resolve the missing axis against the book's page count.
    ///
    /// With an unknown total, a page submission records percentage 0 and a
    /// percentage submission records page 0; both are rewritten by the full
    /// recompute once a count is set.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::PagePastEnd` when a page submission exceeds a
    /// known total; that keeps the stored percentage inside 0..=100.
    pub fn resolve(self, total_pages: Option<u32>) -> Result<ResolvedProgress, ProgressError> {
        match (self, total_pages) {
            (Self::Page(page), Some(total)) => {
                if page > total {
                    return Err(ProgressError::PagePastEnd { page, total });
                }
                Ok(ResolvedProgress {
                    page,
                    percentage: percentage_of(page, total),
                })
            }
            (Self::Page(page), None) => Ok(ResolvedProgress {
                page,
                percentage: 0,
            }),
            (Self::Percent(pct), Some(total)) => Ok(ResolvedProgress {
                page: page_at(pct, total),
                percentage: pct,
            }),
            (Self::Percent(pct), None) => Ok(ResolvedProgress {
                page: 0,
                percentage: pct,
            }),
        }
    }
}

/// A progress point resolved onto both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedProgress {
    pub page: u32,
    pub percentage: u8,
}

//
// ─── ARITHMETIC ────────────────────────────────────────────────────────────────
//

/// Truncating percentage: `floor(page / total * 100)`.
///
/// 300 of 350 pages is 85%, never 86; completion only fires at a true 100.
/// Inputs past the end are rejected upstream, so the result stays in 0..=100.
#[must_use]
pub fn percentage_of(page: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u64::from(page) * 100 / u64::from(total);
    u8::try_from(pct).unwrap_or(100)
}

/// Truncating page for a percentage: `floor(total * pct / 100)`.
#[must_use]
pub fn page_at(percentage: u8, total: u32) -> u32 {
    let page = u64::from(total) * u64::from(percentage) / 100;
    u32::try_from(page).unwrap_or(total)
}

/// Pages covered since the previous entry, floored at zero.
///
/// A correction entry that moves backwards records no negative delta; the
/// ground truth stays in `current_page`.
#[must_use]
pub fn pages_read(current_page: u32, previous_page: u32) -> u32 {
    current_page.saturating_sub(previous_page)
}

//
// ─── PROGRESS LOG ENTRY ────────────────────────────────────────────────────────
//

/// One point-in-time reading-progress observation.
///
/// Entries are append-only: the core never deletes them, and a page-count
/// change rewrites only the derived fields (`current_percentage`,
/// `pages_read`) while `current_page` and `progress_date` are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLogEntry {
    pub id: EntryId,
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

impl ProgressLogEntry {
    /// Chronological ordering key for a session's ledger.
    ///
    /// Same-day entries fall back to insertion order, which keeps the
    /// recompute walk deterministic.
    #[must_use]
    pub fn chrono_key(&self) -> (NaiveDate, EntryId) {
        (self.progress_date, self.id)
    }

    /// This entry's value on the requested axis.
    #[must_use]
    pub fn measure(&self, unit: ProgressUnit) -> u32 {
        match unit {
            ProgressUnit::Pages => self.current_page,
            ProgressUnit::Percent => u32::from(self.current_percentage),
        }
    }
}

//
// ─── RECOMPUTE ─────────────────────────────────────────────────────────────────
//

/// Rewrite `pages_read` for a session's ledger in chronological order.
///
/// Used after a retroactive insert so the delta law (`pages_read(k) =
/// max(0, page(k) - page(k-1))`, `page(0) := 0`) holds for the whole session.
pub fn recompute_deltas(entries: &mut [ProgressLogEntry]) {
    entries.sort_by_key(ProgressLogEntry::chrono_key);
    let mut previous_page = 0;
    for entry in entries {
        entry.pages_read = pages_read(entry.current_page, previous_page);
        previous_page = entry.current_page;
    }
}

/// Rewrite all derived fields of a session's ledger against a new page count.
///
/// `current_page` and `progress_date` are never altered. Running this twice
/// with the same total is a no-op the second time.
pub fn recompute(entries: &mut [ProgressLogEntry], new_total_pages: u32) {
    for entry in entries.iter_mut() {
        entry.current_percentage = percentage_of(entry.current_page, new_total_pages);
    }
    recompute_deltas(entries);
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{fixed_now, fixed_today};

    fn entry(id: u64, page: u32, pct: u8, date: NaiveDate) -> ProgressLogEntry {
        ProgressLogEntry {
            id: EntryId::new(id),
            book_id: BookId::new(1),
            session_id: SessionId::new(1),
            user_id: None,
            current_page: page,
            current_percentage: pct,
            pages_read: 0,
            progress_date: date,
            notes: None,
            created_at: fixed_now(),
        }
    }

    #[test]
    fn percentage_truncates_instead_of_rounding() {
        assert_eq!(percentage_of(300, 350), 85);
        assert_eq!(percentage_of(300, 300), 100);
        assert_eq!(percentage_of(1, 3), 33);
        assert_eq!(percentage_of(0, 300), 0);
    }

    #[test]
    fn percentage_of_unknown_total_is_zero() {
        assert_eq!(percentage_of(10, 0), 0);
    }

    #[test]
    fn page_at_truncates() {
        assert_eq!(page_at(50, 301), 150);
        assert_eq!(page_at(100, 350), 350);
        assert_eq!(page_at(0, 350), 0);
    }

    #[test]
    fn pages_read_floors_at_zero() {
        assert_eq!(pages_read(150, 100), 50);
        assert_eq!(pages_read(100, 100), 0);
        assert_eq!(pages_read(90, 100), 0);
        assert_eq!(pages_read(10, 0), 10);
    }

    #[test]
    fn measure_input_must_be_exclusive() {
        let err = ProgressMeasure::from_input(Some(10), Some(50)).unwrap_err();
        assert!(matches!(err, ProgressError::ConflictingMeasures));

        let err = ProgressMeasure::from_input(None, None).unwrap_err();
        assert!(matches!(err, ProgressError::MissingMeasure));
    }

    #[test]
    fn percentage_input_is_bounded() {
        let err = ProgressMeasure::from_input(None, Some(101)).unwrap_err();
        assert!(matches!(err, ProgressError::PercentageOutOfRange(101)));

        let measure = ProgressMeasure::from_input(None, Some(100)).unwrap();
        assert_eq!(measure, ProgressMeasure::Percent(100));
    }

    #[test]
    fn resolve_derives_the_missing_axis() {
        let from_page = ProgressMeasure::Page(150).resolve(Some(350)).unwrap();
        assert_eq!(from_page.page, 150);
        assert_eq!(from_page.percentage, 42);

        let from_pct = ProgressMeasure::Percent(50).resolve(Some(350)).unwrap();
        assert_eq!(from_pct.page, 175);
        assert_eq!(from_pct.percentage, 50);
    }

    #[test]
    fn resolve_rejects_pages_past_the_end() {
        let err = ProgressMeasure::Page(351).resolve(Some(350)).unwrap_err();
        assert!(matches!(
            err,
            ProgressError::PagePastEnd {
                page: 351,
                total: 350
            }
        ));
    }

    #[test]
    fn resolve_without_total_records_zero_for_the_missing_axis() {
        let from_page = ProgressMeasure::Page(150).resolve(None).unwrap();
        assert_eq!(from_page.page, 150);
        assert_eq!(from_page.percentage, 0);

        let from_pct = ProgressMeasure::Percent(40).resolve(None).unwrap();
        assert_eq!(from_pct.page, 0);
        assert_eq!(from_pct.percentage, 40);
    }

    #[test]
    fn recompute_rewrites_derived_fields_only() {
        let today = fixed_today();
        let mut entries = vec![
            entry(1, 100, 33, today - chrono::Days::new(2)),
            entry(2, 300, 100, today),
        ];

        recompute(&mut entries, 350);

        assert_eq!(entries[0].current_page, 100);
        assert_eq!(entries[0].current_percentage, 28);
        assert_eq!(entries[0].pages_read, 100);
        assert_eq!(entries[1].current_page, 300);
        assert_eq!(entries[1].current_percentage, 85);
        assert_eq!(entries[1].pages_read, 200);
    }

    #[test]
    fn recompute_is_idempotent() {
        let today = fixed_today();
        let mut entries = vec![
            entry(1, 120, 40, today - chrono::Days::new(1)),
            entry(2, 200, 66, today),
        ];

        recompute(&mut entries, 300);
        let first_pass = entries.clone();
        recompute(&mut entries, 300);

        assert_eq!(entries, first_pass);
    }

    #[test]
    fn recompute_orders_same_day_entries_by_insertion() {
        let today = fixed_today();
        let mut entries = vec![
            entry(3, 80, 0, today),
            entry(2, 50, 0, today),
            entry(1, 20, 0, today - chrono::Days::new(1)),
        ];

        recompute_deltas(&mut entries);

        assert_eq!(entries[0].id, EntryId::new(1));
        assert_eq!(entries[1].id, EntryId::new(2));
        assert_eq!(entries[2].id, EntryId::new(3));
        assert_eq!(
            entries.iter().map(|e| e.pages_read).collect::<Vec<_>>(),
            vec![20, 30, 30]
        );
    }
}
