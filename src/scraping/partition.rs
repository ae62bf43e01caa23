//! Range Partitioner: splits a date span into bounded scrape windows.

use chrono::{Duration, NaiveDate};

use crate::models::DateWindow;

/// Days per "month" when sizing windows
pub const DAYS_PER_MONTH: i64 = 30;

/// Split `[start, end]` into consecutive windows of at most
/// `max_months * 30` days.
///
/// Windows are ordered, do not overlap and cover every day of the span once.
/// A reversed span yields no windows; `max_months` of 0 is treated as 1.
///
/// ```
/// use chrono::NaiveDate;
/// use ffcal::scraping::partition::partition;
///
/// let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
/// let windows = partition(start, end, 1);
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[0].len_days(), 30);
/// ```
pub fn partition(start: NaiveDate, end: NaiveDate, max_months: u32) -> Vec<DateWindow> {
    let span = DAYS_PER_MONTH * i64::from(max_months.max(1));
    let mut windows = Vec::new();
    if start > end {
        return windows;
    }

    // Upper bound on iterations in case date arithmetic stops advancing
    let max_windows = (end - start).num_days() / span + 2;
    let mut cursor = start;

    while cursor <= end && (windows.len() as i64) < max_windows {
        let window_end = cursor
            .checked_add_signed(Duration::days(span - 1))
            .map_or(end, |d| d.min(end));
        let Some(window) = DateWindow::new(cursor, window_end) else {
            break;
        };
        windows.push(window);

        match window_end.succ_opt() {
            Some(next) if next > cursor => cursor = next,
            _ => break,
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn assert_covers(start: NaiveDate, end: NaiveDate, months: u32) {
        let windows = partition(start, end, months);
        let days: Vec<NaiveDate> = windows.iter().flat_map(|w| w.days()).collect();
        let expected: Vec<NaiveDate> = DateWindow::new(start, end).unwrap().days().collect();
        assert_eq!(days, expected, "coverage for {start}..={end} / {months}");
        for w in &windows {
            assert!(w.len_days() <= DAYS_PER_MONTH * i64::from(months.max(1)));
        }
        for pair in windows.windows(2) {
            assert!(pair[0].end() < pair[1].start());
        }
    }

    #[test]
    fn covers_spans_exactly_once() {
        let cases = [
            (d(2025, 1, 1), d(2025, 1, 1), 1),
            (d(2025, 1, 1), d(2025, 1, 30), 1),
            (d(2025, 1, 1), d(2025, 1, 31), 1),
            (d(2024, 12, 15), d(2025, 6, 30), 2),
            (d(2024, 2, 1), d(2024, 3, 1), 1),
            (d(2023, 1, 1), d(2025, 12, 31), 3),
            (d(2025, 3, 3), d(2025, 3, 14), 0),
        ];
        for (start, end, months) in cases {
            assert_covers(start, end, months);
        }
    }

    #[test]
    fn single_day_span_is_single_window() {
        let windows = partition(d(2025, 3, 5), d(2025, 3, 5), 1);
        assert_eq!(windows, vec![DateWindow::single_day(d(2025, 3, 5))]);
    }

    #[test]
    fn reversed_span_is_empty() {
        assert!(partition(d(2025, 3, 5), d(2025, 3, 1), 1).is_empty());
    }

    #[test]
    fn terminates_at_calendar_edge() {
        let end = NaiveDate::MAX;
        let start = end - Duration::days(45);
        let windows = partition(start, end, 1);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end(), end);
    }
}
