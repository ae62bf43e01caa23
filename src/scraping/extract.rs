//! Calendar Extractor
//!
//! Reads events from the page's embedded calendar state when it is there and
//! uses the rendered table to backfill values. Without embedded state the
//! table is the only source.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;
use tracing::{debug, info};

use super::markup::{self, midday, MarkupRow};
use super::pacing::Pacing;
use super::session::SessionHandle;
use crate::models::{DateWindow, NoticeFlags, RawEvent, NOT_AVAILABLE, UNKNOWN_COUNTRY};
use crate::normalize::country_for_code;

/// Script yielding the embedded calendar state as a JSON string
pub const CALENDAR_STATE_PROBE: &str = "JSON.stringify(window.calendarComponentStates || null)";

const TITLE_FIELDS: &[&str] = &["soloTitle", "trimmedPrefixedName", "prefixedName", "name"];
const IMPACT_FIELDS: &[&str] = &["impactClass", "impactName", "impactTitle", "impact"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    EmbeddedState,
    Markup,
}

/// Result of reading one loaded calendar page
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found {
        source: ExtractionSource,
        events: Vec<RawEvent>,
        /// Records discarded for lacking a title
        dropped: usize,
    },
    /// The calendar is there but lists nothing
    Empty,
    /// Neither embedded state nor a calendar table on the page
    MissingCalendar,
}

impl Extraction {
    pub fn event_count(&self) -> usize {
        match self {
            Extraction::Found { events, .. } => events.len(),
            _ => 0,
        }
    }
}

pub struct CalendarExtractor {
    probe_attempts: u32,
    pacing: Pacing,
}

impl CalendarExtractor {
    pub fn new(probe_attempts: u32, pacing: Pacing) -> Self {
        Self {
            probe_attempts: probe_attempts.max(1),
            pacing,
        }
    }

    /// Extract events for `window` from the page loaded in `handle`
    pub fn extract(&self, handle: &SessionHandle, window: &DateWindow) -> Result<Extraction> {
        let state = self.probe_state(handle)?;
        let html = handle.page()?.content()?;
        let rows = markup::parse_calendar(&html, window)?;

        let extraction = reconcile(state.as_ref(), rows, window);
        match &extraction {
            Extraction::Found {
                source,
                events,
                dropped,
            } => info!(
                "Extracted {} event(s) for {} from {:?} ({} untitled dropped)",
                events.len(),
                window,
                source,
                dropped
            ),
            Extraction::Empty => info!("No events listed for {}", window),
            Extraction::MissingCalendar => info!("No calendar found on page for {}", window),
        }
        Ok(extraction)
    }

    /// Poll for the embedded state; it is often populated after load
    fn probe_state(&self, handle: &SessionHandle) -> Result<Option<Value>> {
        for attempt in 1..=self.probe_attempts {
            match handle.page()?.evaluate_json(CALENDAR_STATE_PROBE) {
                Ok(Some(state)) => {
                    debug!("Embedded calendar state found on probe {}", attempt);
                    return Ok(Some(state));
                }
                Ok(None) => {}
                Err(e) => debug!("Embedded state probe {} failed: {:#}", attempt, e),
            }
            if attempt < self.probe_attempts {
                self.pacing.pause(self.pacing.js_probe_interval);
            }
        }
        debug!("No embedded calendar state after {} probe(s)", self.probe_attempts);
        Ok(None)
    }
}

/// Merge embedded-state events with rendered rows.
///
/// Rendered rows backfill values into the state event whose title contains
/// theirs, and their impact cell always replaces the state's impact hint.
pub fn reconcile(
    state: Option<&Value>,
    rows: Option<Vec<MarkupRow>>,
    window: &DateWindow,
) -> Extraction {
    let state_events = state.map(|s| events_from_state(s, window.start()));

    let (source, candidates) = match (state_events, rows) {
        (Some(mut events), Some(rows)) if !events.is_empty() => {
            enhance(&mut events, &rows);
            (ExtractionSource::EmbeddedState, events)
        }
        (Some(events), None) if !events.is_empty() => (ExtractionSource::EmbeddedState, events),
        (_, Some(rows)) => (
            ExtractionSource::Markup,
            rows.into_iter().map(MarkupRow::into_raw).collect(),
        ),
        (Some(_), None) => return Extraction::Empty,
        (None, None) => return Extraction::MissingCalendar,
    };

    let total = candidates.len();
    let events: Vec<RawEvent> = candidates
        .into_iter()
        .filter(|e| !e.title.trim().is_empty())
        .collect();
    let dropped = total - events.len();

    if events.is_empty() && dropped == 0 {
        Extraction::Empty
    } else {
        Extraction::Found {
            source,
            events,
            dropped,
        }
    }
}

/// Walk `{component: {days: [{events: [...]}]}}`.
///
/// Datelines are rendered in the local timezone, the one the browser shows
/// rendered rows in, so both sources agree on timestamps.
pub fn events_from_state(state: &Value, fallback_day: NaiveDate) -> Vec<RawEvent> {
    events_from_state_in(state, fallback_day, &Local)
}

/// `events_from_state` with datelines rendered in `tz`
pub fn events_from_state_in<Tz: TimeZone>(
    state: &Value,
    fallback_day: NaiveDate,
    tz: &Tz,
) -> Vec<RawEvent> {
    let components: Vec<&Value> = match state {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };

    let mut events = Vec::new();
    for component in components {
        let Some(days) = component.get("days").and_then(Value::as_array) else {
            continue;
        };
        for day in days {
            let day_fallback = day
                .get("dateline")
                .and_then(|value| dateline(value, tz))
                .map(|ts| ts.date())
                .unwrap_or(fallback_day);
            let Some(day_events) = day.get("events").and_then(Value::as_array) else {
                continue;
            };
            events.extend(
                day_events
                    .iter()
                    .map(|event| raw_from_state(event, day_fallback, tz)),
            );
        }
    }
    events
}

fn raw_from_state<Tz: TimeZone>(event: &Value, fallback_day: NaiveDate, tz: &Tz) -> RawEvent {
    let title = first_text(event, TITLE_FIELDS).unwrap_or_default();
    let timestamp = event
        .get("dateline")
        .and_then(|value| dateline(value, tz))
        .unwrap_or_else(|| fallback_day.and_time(midday()));

    let mut raw = RawEvent::new(timestamp, title);
    // Unmapped codes stay unresolved so the normalizer can place them
    raw.country = text_field(event, "country")
        .and_then(|code| country_for_code(&code))
        .unwrap_or(UNKNOWN_COUNTRY)
        .to_string();
    raw.currency = text_field(event, "currency").unwrap_or_default();
    raw.impact_hint = first_text(event, IMPACT_FIELDS);
    raw.actual = text_field(event, "actual").unwrap_or_else(|| NOT_AVAILABLE.to_string());
    raw.forecast = text_field(event, "forecast").unwrap_or_else(|| NOT_AVAILABLE.to_string());
    raw.previous = text_field(event, "previous").unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let flag = |name: &str| event.get(name).and_then(Value::as_bool);
    let flags = [flag("hasDataValues"), flag("hasGraph"), flag("hasLinkedThreads")];
    if flags.iter().any(Option::is_some) {
        raw.notice = Some(NoticeFlags {
            has_data_values: flags[0].unwrap_or(false),
            has_graph: flags[1].unwrap_or(false),
            has_linked_threads: flags[2].unwrap_or(false),
        });
    }
    raw
}

fn enhance(events: &mut [RawEvent], rows: &[MarkupRow]) {
    let mut enhanced = 0;
    for event in events.iter_mut() {
        let Some(row) = matching_row(event, rows) else {
            continue;
        };
        for (target, value) in [
            (&mut event.actual, &row.actual),
            (&mut event.forecast, &row.forecast),
            (&mut event.previous, &row.previous),
        ] {
            if value != NOT_AVAILABLE {
                *target = value.clone();
            }
        }
        if row.impact_hint.is_some() {
            event.impact_hint = row.impact_hint.clone();
        }
        enhanced += 1;
    }
    debug!("Enhanced {}/{} event(s) from rendered rows", enhanced, events.len());
}

/// Exact title match first, then a rendered title contained in the event's
fn matching_row<'a>(event: &RawEvent, rows: &'a [MarkupRow]) -> Option<&'a MarkupRow> {
    let title = event.title.to_lowercase();
    let same_currency = |row: &MarkupRow| {
        row.currency.is_empty()
            || event.currency.is_empty()
            || row.currency.eq_ignore_ascii_case(&event.currency)
    };
    let candidates = || {
        rows.iter()
            .filter(|row| !row.title.trim().is_empty())
            .filter(move |row| same_currency(*row))
    };

    candidates()
        .find(|row| row.title.to_lowercase() == title)
        .or_else(|| candidates().find(|row| title.contains(&row.title.to_lowercase())))
}

fn dateline<Tz: TimeZone>(value: &Value, tz: &Tz) -> Option<NaiveDateTime> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.with_timezone(tz).naive_local())
}

fn text_field(event: &Value, name: &str) -> Option<String> {
    let text = match event.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_text(event: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|name| text_field(event, name))
}
