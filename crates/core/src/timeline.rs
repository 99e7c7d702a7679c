//! Temporal-consistency check for a session's progress ledger.
//!
//! Progress must be monotonic in time: a candidate value may not fall behind
//! anything logged earlier, nor overtake anything logged later. The check is
//! pure and runs over the session's existing entries, so both the append and
//! edit flows use it (the edit flow excludes the entry's own id).

use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{EntryId, ProgressLogEntry, ProgressUnit};

/// A monotonicity violation, naming the entry the candidate collides with.
///
/// The direction matters for the message a caller renders: a `before`
/// conflict means the candidate is behind history, an `after` conflict means
/// it would overtake the future.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineConflict {
    #[error("progress must be at least {value} {unit}; {value} {unit} was already logged on {date}")]
    BehindEarlierEntry {
        date: NaiveDate,
        value: u32,
        unit: ProgressUnit,
    },

    #[error("progress must be at most {value} {unit}; {value} {unit} is already logged later, on {date}")]
    AheadOfLaterEntry {
        date: NaiveDate,
        value: u32,
        unit: ProgressUnit,
    },
}

/// Check a candidate progress value against the session's other entries.
///
/// Entries are split into strictly-before and strictly-after the candidate
/// date; the candidate must satisfy `max(before) <= value <= min(after)`.
/// Entries sharing the candidate's exact date constrain nothing (same-day
/// corrections are allowed to disagree), and `exclude` skips the entry being
/// edited.
///
/// # Errors
///
/// Returns the conflicting entry's date and value, tagged with the
/// direction of the violation.
pub fn validate(
    entries: &[ProgressLogEntry],
    candidate_date: NaiveDate,
    candidate_value: u32,
    unit: ProgressUnit,
    exclude: Option<EntryId>,
) -> Result<(), TimelineConflict> {
    let mut max_before: Option<&ProgressLogEntry> = None;
    let mut min_after: Option<&ProgressLogEntry> = None;

    for entry in entries {
        if exclude == Some(entry.id) || entry.progress_date == candidate_date {
            continue;
        }
        if entry.progress_date < candidate_date {
            if max_before.is_none_or(|b| entry.measure(unit) > b.measure(unit)) {
                max_before = Some(entry);
            }
        } else if min_after.is_none_or(|a| entry.measure(unit) < a.measure(unit)) {
            min_after = Some(entry);
        }
    }

    if let Some(before) = max_before {
        if candidate_value < before.measure(unit) {
            return Err(TimelineConflict::BehindEarlierEntry {
                date: before.progress_date,
                value: before.measure(unit),
                unit,
            });
        }
    }

    if let Some(after) = min_after {
        if candidate_value > after.measure(unit) {
            return Err(TimelineConflict::AheadOfLaterEntry {
                date: after.progress_date,
                value: after.measure(unit),
                unit,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookId, SessionId};
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
    fn empty_ledger_accepts_anything() {
        assert!(validate(&[], fixed_today(), 10, ProgressUnit::Pages, None).is_ok());
    }

    #[test]
    fn candidate_between_neighbors_is_accepted() {
        let today = fixed_today();
        let entries = vec![
            entry(1, 50, 16, today - chrono::Days::new(2)),
            entry(2, 200, 66, today + chrono::Days::new(2)),
        ];

        assert!(validate(&entries, today, 120, ProgressUnit::Pages, None).is_ok());
        // The bounds themselves are inclusive.
        assert!(validate(&entries, today, 50, ProgressUnit::Pages, None).is_ok());
        assert!(validate(&entries, today, 200, ProgressUnit::Pages, None).is_ok());
    }

    #[test]
    fn falling_behind_history_names_the_earlier_entry() {
        let today = fixed_today();
        let earlier = today - chrono::Days::new(3);
        let entries = vec![entry(1, 150, 50, earlier)];

        let err = validate(&entries, today, 100, ProgressUnit::Pages, None).unwrap_err();
        assert_eq!(
            err,
            TimelineConflict::BehindEarlierEntry {
                date: earlier,
                value: 150,
                unit: ProgressUnit::Pages,
            }
        );
    }

    #[test]
    fn overtaking_the_future_names_the_later_entry() {
        let today = fixed_today();
        let later = today + chrono::Days::new(3);
        let entries = vec![entry(1, 150, 50, later)];

        let err = validate(&entries, today, 200, ProgressUnit::Pages, None).unwrap_err();
        assert_eq!(
            err,
            TimelineConflict::AheadOfLaterEntry {
                date: later,
                value: 150,
                unit: ProgressUnit::Pages,
            }
        );
    }

    #[test]
    fn tightest_bound_wins_on_each_side() {
        let today = fixed_today();
        let entries = vec![
            entry(1, 30, 10, today - chrono::Days::new(5)),
            entry(2, 90, 30, today - chrono::Days::new(1)),
            entry(3, 240, 80, today + chrono::Days::new(1)),
            entry(4, 280, 93, today + chrono::Days::new(5)),
        ];

        let err = validate(&entries, today, 50, ProgressUnit::Pages, None).unwrap_err();
        assert!(matches!(
            err,
            TimelineConflict::BehindEarlierEntry { value: 90, .. }
        ));

        let err = validate(&entries, today, 250, ProgressUnit::Pages, None).unwrap_err();
        assert!(matches!(
            err,
            TimelineConflict::AheadOfLaterEntry { value: 240, .. }
        ));
    }

    #[test]
    fn same_day_entries_do_not_constrain() {
        let today = fixed_today();
        let entries = vec![entry(1, 150, 50, today)];

        // A same-day correction may go backwards.
        assert!(validate(&entries, today, 100, ProgressUnit::Pages, None).is_ok());
    }

    #[test]
    fn percent_axis_is_compared_when_requested() {
        let today = fixed_today();
        let earlier = today - chrono::Days::new(1);
        let entries = vec![entry(1, 150, 50, earlier)];

        let err = validate(&entries, today, 40, ProgressUnit::Percent, None).unwrap_err();
        assert_eq!(
            err,
            TimelineConflict::BehindEarlierEntry {
                date: earlier,
                value: 50,
                unit: ProgressUnit::Percent,
            }
        );
    }

    #[test]
    fn edit_flow_excludes_the_entry_itself() {
        let today = fixed_today();
        let entries = vec![
            entry(1, 100, 33, today - chrono::Days::new(1)),
            entry(2, 200, 66, today),
        ];
        let tomorrow = today + chrono::Days::new(1);

        // Moving entry 2 to tomorrow at a lower page would collide with its
        // own old position; excluding itself, only entry 1 bounds it.
        let err = validate(&entries, tomorrow, 150, ProgressUnit::Pages, None).unwrap_err();
        assert!(matches!(
            err,
            TimelineConflict::BehindEarlierEntry { value: 200, .. }
        ));

        assert!(validate(
            &entries,
            tomorrow,
            150,
            ProgressUnit::Pages,
            Some(EntryId::new(2))
        )
        .is_ok());

        let err = validate(
            &entries,
            tomorrow,
            50,
            ProgressUnit::Pages,
            Some(EntryId::new(2)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TimelineConflict::BehindEarlierEntry { value: 100, .. }
        ));
    }
}
