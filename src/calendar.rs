//! Reporting windows and business-day arithmetic

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

/// Length of the rolling window used by the trailing metrics
pub const TRAILING_DAYS: i64 = 30;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Inclusive range of calendar days, evaluated in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub(crate) fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// `[reference - 29 days, reference]`, thirty calendar days
    pub fn trailing(reference: NaiveDate) -> Self {
        Self {
            start: reference - Duration::days(TRAILING_DAYS - 1),
            end: reference,
        }
    }

    /// First through last day of a calendar month (`month` is 1-based)
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Self::new(start, next.pred_opt()?)
    }

    /// The calendar month that contains `date`
    pub fn month_of(date: NaiveDate) -> Self {
        // from_ymd_opt cannot fail for the year/month of an existing date
        Self::month(date.year(), date.month()).unwrap_or(Self {
            start: date,
            end: date,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Midnight UTC at the start of the first day
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC after the last day (exclusive bound)
    pub fn end_instant(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc()
    }

    pub fn seconds(&self) -> i64 {
        self.days() * 86_400
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_instant() && at < self.end_instant()
    }
}

/// Count Monday-Friday calendar days from `start` to `end`, both inclusive.
///
/// A same-day span on a weekday counts as 1. Holidays are not considered.
/// Returns 0 when `end` precedes `start`.
pub fn business_days(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let first = start.date_naive();
    let last = end.date_naive();

    let count = first
        .iter_days()
        .take_while(|day| *day <= last)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .count();

    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Parse a three-letter month abbreviation (case-insensitive) into 1..=12
pub fn parse_month(abbrev: &str) -> Option<u32> {
    let lower = abbrev.trim().to_ascii_lowercase();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|m| *m == lower)
        .and_then(|idx| u32::try_from(idx + 1).ok())
}
