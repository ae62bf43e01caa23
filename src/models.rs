use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel stored for missing actual/forecast/previous values
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder country for records not yet resolved
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Three-level severity of an economic event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::High => "High",
            Impact::Medium => "Medium",
            Impact::Low => "Low",
        }
    }

    /// Map any impact indicator to a level.
    ///
    /// Accepts semantic words ("High", "Medium Impact Expected") as well as
    /// presentational leftovers: CSS classes (`Icon--Ff-Impact-Red`), inline
    /// styles or whole cell markup. The input is split into lowercase
    /// alphanumeric tokens; the strongest recognized token wins. Anything
    /// unrecognized is `Low`.
    ///
    /// ```
    /// use ffcal::models::Impact;
    ///
    /// assert_eq!(Impact::from_indicator("Icon--Ff-Impact-Red"), Impact::High);
    /// assert_eq!(Impact::from_indicator("icon--ff-impact-ora"), Impact::Medium);
    /// assert_eq!(Impact::from_indicator(""), Impact::Low);
    /// ```
    pub fn from_indicator(indicator: &str) -> Self {
        let lowered = indicator.to_lowercase();
        let mut level = Impact::Low;
        for token in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
            match token {
                "red" | "high" => return Impact::High,
                "ora" | "orange" | "medium" | "med" => level = Impact::Medium,
                _ => {}
            }
        }
        level
    }

    /// `from_indicator` over an optional hint; absent or blank hints are `Low`
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some(h) if !h.trim().is_empty() => Impact::from_indicator(h),
            _ => Impact::Low,
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Impact {
    type Err = ();

    /// Never fails: unknown tokens normalize to `Low`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Impact::from_indicator(s))
    }
}

/// Optional annotation flags carried by the embedded calendar state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoticeFlags {
    pub has_data_values: bool,
    pub has_graph: bool,
    pub has_linked_threads: bool,
}

/// Event fields as pulled off the page, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub timestamp: NaiveDateTime,
    pub title: String,
    pub country: String,
    pub currency: String,
    /// Whatever impact indicator the page exposed (class, word, markup)
    pub impact_hint: Option<String>,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
    pub notice: Option<NoticeFlags>,
}

impl RawEvent {
    pub fn new(timestamp: NaiveDateTime, title: impl Into<String>) -> Self {
        Self {
            timestamp,
            title: title.into(),
            country: UNKNOWN_COUNTRY.to_string(),
            currency: String::new(),
            impact_hint: None,
            actual: NOT_AVAILABLE.to_string(),
            forecast: NOT_AVAILABLE.to_string(),
            previous: NOT_AVAILABLE.to_string(),
            notice: None,
        }
    }
}

impl From<EventRecord> for RawEvent {
    fn from(record: EventRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            title: record.title,
            country: record.country,
            currency: record.currency,
            impact_hint: Some(record.impact.as_str().to_string()),
            actual: record.actual,
            forecast: record.forecast,
            previous: record.previous,
            notice: record.notice,
        }
    }
}

/// One normalized economic-calendar entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub timestamp: NaiveDateTime,
    pub title: String,
    pub country: String,
    pub currency: String,
    pub impact: Impact,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<NoticeFlags>,
}

impl EventRecord {
    /// Deduplication key used by record sinks
    pub fn key(&self) -> EventKey {
        EventKey {
            timestamp: self.timestamp,
            title: self.title.clone(),
            currency: self.currency.clone(),
        }
    }
}

/// Natural key `(timestamp, title, currency)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub timestamp: NaiveDateTime,
    pub title: String,
    pub currency: String,
}

/// Trading instruments affected by a record's currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffectedPairs {
    Pairs(Vec<String>),
    /// Currency has no mapping; rendered as `N/A`
    Unmapped,
}

impl fmt::Display for AffectedPairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffectedPairs::Pairs(pairs) if !pairs.is_empty() => f.write_str(&pairs.join(", ")),
            _ => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// Record plus its derived instrument list
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedEvent {
    pub event: EventRecord,
    pub affected_pairs: AffectedPairs,
}

/// Inclusive `[start, end]` span handled by one scrape attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Returns `None` when `end` precedes `start`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, both ends included
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Every date in the window, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

/// The target publishes no events on Saturdays and Sundays
pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}
