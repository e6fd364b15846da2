//! Rolling four-month window and month bucket keys.
//!
//! Buckets are keyed `"<MonthName> <Year>"` using the fixed English month
//! names chrono emits for `%B`, so keys never depend on the host locale.

use chrono::{Datelike, NaiveDate};

pub const WINDOW_MONTHS: u32 = 4;

const KEY_FORMAT: &str = "%B %Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthBucket {
    pub key: String,
    pub ordinal: u8,
    pub year: i32,
    pub month: u32,
    /// First day of the month.
    pub start: NaiveDate,
    /// First day of the following month (exclusive bound).
    pub end: NaiveDate,
}

impl MonthBucket {
    fn new(ordinal: u8, year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let (next_year, next_month) = shift_month(year, month, 1);
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
        Some(MonthBucket {
            key: month_key(start),
            ordinal,
            year,
            month,
            start,
            end,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    reference: NaiveDate,
    buckets: Vec<MonthBucket>,
}

impl MonthWindow {
    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    pub fn buckets(&self) -> &[MonthBucket] {
        &self.buckets
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|b| b.key.as_str())
    }

    pub fn bucket(&self, key: &str) -> Option<&MonthBucket> {
        self.buckets.iter().find(|b| b.key == key)
    }

    /// First day of the window. A window with no representable months
    /// collapses to the empty range at `reference`.
    pub fn start(&self) -> NaiveDate {
        self.buckets.first().map_or(self.reference, |b| b.start)
    }

    /// Start of the month after the last bucket.
    pub fn end(&self) -> NaiveDate {
        self.buckets.last().map_or(self.reference, |b| b.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date < self.end()
    }

    /// The bucket whose half-open `[start, end)` interval holds `date`.
    pub fn assign_date(&self, date: Option<NaiveDate>) -> Option<&MonthBucket> {
        let date = date?;
        if !self.contains(date) {
            return None;
        }
        self.buckets.iter().find(|b| b.contains(date))
    }
}

/// Computes the four buckets for the month of `reference` and the next three.
pub fn compute_window(reference: NaiveDate) -> MonthWindow {
    let buckets = (0..WINDOW_MONTHS)
        .filter_map(|offset| {
            let (year, month) = shift_month(reference.year(), reference.month(), offset);
            MonthBucket::new(offset as u8, year, month)
        })
        .collect();
    MonthWindow { reference, buckets }
}

/// Bucket key for the record's close date, or `None` when outside the window.
pub fn assign<'w>(close_date: Option<NaiveDate>, window: &'w MonthWindow) -> Option<&'w str> {
    window.assign_date(close_date).map(|b| b.key.as_str())
}

pub fn month_key(date: NaiveDate) -> String {
    date.format(KEY_FORMAT).to_string()
}

/// Splits a `"July 2025"` key back into `(2025, 7)`.
pub fn parse_month_key(key: &str) -> Option<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("1 {}", key.trim()), "%d %B %Y").ok()?;
    Some((date.year(), date.month()))
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_close_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = shift_month(year, month, 1);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|next| next.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn shift_month(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let zero_based = month.saturating_sub(1) + offset;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_has_four_contiguous_months() {
        for reference in [date(2025, 7, 14), date(2025, 11, 30), date(2024, 12, 31), date(2024, 1, 1)] {
            let window = compute_window(reference);
            let buckets = window.buckets();
            assert_eq!(buckets.len(), 4);
            assert_eq!(buckets[0].ordinal, 0);
            assert!(buckets[0].contains(reference));
            for pair in buckets.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
                assert!(pair[0].start < pair[1].start);
                assert_eq!(pair[1].ordinal, pair[0].ordinal + 1);
            }
        }
    }

    #[test]
    fn test_window_keys_cross_year() {
        let window = compute_window(date(2025, 11, 3));
        let keys: Vec<&str> = window.keys().collect();
        assert_eq!(
            keys,
            vec!["November 2025", "December 2025", "January 2026", "February 2026"]
        );
    }

    #[test]
    fn test_last_day_of_final_month_is_included() {
        let window = compute_window(date(2025, 7, 1));
        assert_eq!(assign(Some(date(2025, 10, 31)), &window), Some("October 2025"));
        assert_eq!(assign(Some(date(2025, 11, 1)), &window), None);
    }

    #[test]
    fn test_window_at_calendar_limit_is_empty_not_panicking() {
        let window = compute_window(NaiveDate::MAX);
        assert!(window.buckets().len() < 4);
        assert!(!window.contains(NaiveDate::MAX));
        assert_eq!(assign(Some(NaiveDate::MAX), &window), None);
        if window.buckets().is_empty() {
            assert_eq!(window.start(), NaiveDate::MAX);
            assert_eq!(window.end(), NaiveDate::MAX);
        }
    }

    #[test]
    fn test_dates_before_window_are_excluded() {
        let window = compute_window(date(2025, 7, 20));
        assert_eq!(assign(Some(date(2025, 7, 1)), &window), Some("July 2025"));
        assert_eq!(assign(Some(date(2025, 6, 30)), &window), None);
        assert_eq!(assign(None, &window), None);
    }

    #[test]
    fn test_every_day_in_window_lands_in_its_own_month() {
        let window = compute_window(date(2024, 12, 5));
        let mut day = window.start();
        while day < window.end() {
            let key = assign(Some(day), &window).expect("inside window");
            assert_eq!(key, month_key(day));
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_parse_month_key() {
        assert_eq!(parse_month_key("July 2025"), Some((2025, 7)));
        assert_eq!(parse_month_key("February 2028"), Some((2028, 2)));
        assert_eq!(parse_month_key("Smarch 2025"), None);
    }

    #[test]
    fn test_parse_close_date_accepts_timestamps() {
        assert_eq!(parse_close_date("2025-08-09"), Some(date(2025, 8, 9)));
        assert_eq!(parse_close_date("2025-08-09T10:00:00+02:00"), Some(date(2025, 8, 9)));
        assert_eq!(parse_close_date("next week"), None);
        assert_eq!(parse_close_date(""), None);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 9), 30);
        assert_eq!(days_in_month(2025, 12), 31);
    }
}
