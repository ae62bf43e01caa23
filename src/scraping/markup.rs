//! Rendered calendar table parsing.
//!
//! Cells are assigned roles by an ordered list of recognizer rules. Class
//! rules run first; when they cannot find the title, text-shape rules run;
//! when those also fail, rows with enough cells fall back to fixed positions.

use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

use crate::models::{DateWindow, RawEvent, NOT_AVAILABLE};

/// Currency codes the calendar lists in its currency column
pub const KNOWN_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "NZD", "CAD", "CNY", "ALL",
];

/// Column roles within a calendar row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Date,
    Time,
    Currency,
    Impact,
    Title,
    Actual,
    Forecast,
    Previous,
}

/// Columns used when no rule finds the title: time, currency, impact,
/// title, actual, forecast, previous
const POSITIONAL: [Role; 7] = [
    Role::Time,
    Role::Currency,
    Role::Impact,
    Role::Title,
    Role::Actual,
    Role::Forecast,
    Role::Previous,
];

/// What a rule sees of a cell
struct Cell {
    class: String,
    text: String,
    html: String,
    has_link: bool,
}

struct Shapes {
    time: Regex,
    value: Regex,
    day: Regex,
}

type Predicate = fn(&Cell, &Shapes) -> bool;

struct Rule {
    role: Role,
    matches: Predicate,
}

const CLASS_RULES: &[Rule] = &[
    Rule { role: Role::Date, matches: |c, _| c.class.contains("calendar__date") },
    Rule { role: Role::Time, matches: |c, _| c.class.contains("calendar__time") },
    Rule { role: Role::Currency, matches: |c, _| c.class.contains("calendar__currency") },
    Rule { role: Role::Impact, matches: |c, _| c.class.contains("calendar__impact") },
    Rule { role: Role::Title, matches: |c, _| c.class.contains("calendar__event") },
    Rule { role: Role::Actual, matches: |c, _| c.class.contains("calendar__actual") },
    Rule { role: Role::Forecast, matches: |c, _| c.class.contains("calendar__forecast") },
    Rule { role: Role::Previous, matches: |c, _| c.class.contains("calendar__previous") },
];

// Value rules repeat so consecutive value-shaped cells fill
// actual, forecast and previous in that order.
const SHAPE_RULES: &[Rule] = &[
    Rule { role: Role::Time, matches: |c, s| s.time.is_match(&c.text) },
    Rule {
        role: Role::Currency,
        matches: |c, _| KNOWN_CURRENCIES.contains(&c.text.to_uppercase().as_str()),
    },
    Rule {
        role: Role::Impact,
        matches: |c, _| c.class.contains("impact") || c.html.to_lowercase().contains("impact"),
    },
    Rule { role: Role::Title, matches: |c, _| c.has_link && !c.text.is_empty() },
    Rule { role: Role::Actual, matches: |c, s| s.value.is_match(&c.text) },
    Rule { role: Role::Forecast, matches: |c, s| s.value.is_match(&c.text) },
    Rule { role: Role::Previous, matches: |c, s| s.value.is_match(&c.text) },
];

/// One calendar row with roles resolved and its timestamp computed
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupRow {
    pub timestamp: NaiveDateTime,
    pub title: String,
    pub currency: String,
    /// Inner markup of the impact cell
    pub impact_hint: Option<String>,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
}

impl MarkupRow {
    pub fn into_raw(self) -> RawEvent {
        let mut raw = RawEvent::new(self.timestamp, self.title);
        raw.currency = self.currency;
        raw.impact_hint = self.impact_hint;
        raw.actual = self.actual;
        raw.forecast = self.forecast;
        raw.previous = self.previous;
        raw
    }
}

/// Parse the calendar table out of a rendered page.
///
/// `Ok(None)` when the page has no calendar table at all; an empty vector
/// when the table is there but lists nothing. Rows carrying no title cell
/// (day separators, spacers) are skipped.
pub fn parse_calendar(html: &str, window: &DateWindow) -> Result<Option<Vec<MarkupRow>>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table.calendar__table")?;
    let row_sel = selector("tr.calendar__row")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;
    let shapes = Shapes::new()?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(None);
    };

    let mut rows = Vec::new();
    let mut day = window.start();
    let mut time: Option<NaiveTime> = None;

    for row in table.select(&row_sel) {
        let cells: Vec<Cell> = row
            .select(&cell_sel)
            .map(|td| Cell::read(td, &link_sel))
            .collect();
        if cells.is_empty() {
            continue;
        }

        let roles = assign_roles(&cells, &shapes);
        let text = |role: Role| roles.get(&role).map(|&i| cells[i].text.as_str());

        if let Some(date) = text(Role::Date).and_then(|t| parse_day(t, window, &shapes)) {
            if date != day {
                time = None;
            }
            day = date;
        }

        match text(Role::Time) {
            Some(t) if !t.is_empty() => time = Some(parse_time(t)),
            _ => {}
        }

        let Some(title) = text(Role::Title) else {
            continue;
        };

        rows.push(MarkupRow {
            timestamp: day.and_time(time.unwrap_or(NaiveTime::MIN)),
            title: title.to_string(),
            currency: text(Role::Currency).unwrap_or_default().to_uppercase(),
            impact_hint: roles.get(&Role::Impact).map(|&i| cells[i].html.clone()),
            actual: value_or_na(text(Role::Actual)),
            forecast: value_or_na(text(Role::Forecast)),
            previous: value_or_na(text(Role::Previous)),
        });
    }

    Ok(Some(rows))
}

/// Resolve cell roles for one row
fn assign_roles(cells: &[Cell], shapes: &Shapes) -> HashMap<Role, usize> {
    let mut roles = HashMap::new();
    apply_rules(CLASS_RULES, cells, shapes, &mut roles);
    if !roles.contains_key(&Role::Title) {
        apply_rules(SHAPE_RULES, cells, shapes, &mut roles);
    }
    if !roles.contains_key(&Role::Title) && cells.len() >= POSITIONAL.len() {
        roles.clear();
        for (i, role) in POSITIONAL.iter().enumerate() {
            roles.insert(*role, i);
        }
    }
    roles
}

/// Each rule claims the first unclaimed cell it matches, unless its role is taken
fn apply_rules(rules: &[Rule], cells: &[Cell], shapes: &Shapes, roles: &mut HashMap<Role, usize>) {
    for rule in rules {
        if roles.contains_key(&rule.role) {
            continue;
        }
        let found = cells.iter().enumerate().find(|(i, cell)| {
            !roles.values().any(|taken| taken == i) && (rule.matches)(cell, shapes)
        });
        if let Some((i, _)) = found {
            roles.insert(rule.role, i);
        }
    }
}

/// Calendar time cell to a time of day.
///
/// ```
/// use chrono::NaiveTime;
/// use ffcal::scraping::markup::parse_time;
///
/// assert_eq!(parse_time("8:30am"), NaiveTime::from_hms_opt(8, 30, 0).unwrap());
/// assert_eq!(parse_time("All Day"), NaiveTime::MIN);
/// assert_eq!(parse_time("Tentative"), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
/// ```
pub fn parse_time(text: &str) -> NaiveTime {
    let cleaned = text.trim().to_lowercase();
    if cleaned.is_empty() || cleaned == "all day" {
        return NaiveTime::MIN;
    }
    let compact: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    NaiveTime::parse_from_str(&compact, "%I:%M%P")
        .or_else(|_| NaiveTime::parse_from_str(&compact, "%H:%M"))
        .unwrap_or_else(|_| midday())
}

/// Default time for events without a usable time
pub fn midday() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()
}

/// "Wed Mar 5" style date cell, placed in whichever year of the window fits
fn parse_day(text: &str, window: &DateWindow, shapes: &Shapes) -> Option<NaiveDate> {
    let caps = shapes.day.captures(text)?;
    let (month, day) = (caps.get(1)?.as_str(), caps.get(2)?.as_str());

    let years = [window.start().year(), window.end().year()];
    let candidates: Vec<NaiveDate> = years
        .iter()
        .filter_map(|year| {
            NaiveDate::parse_from_str(&format!("{} {} {}", month, day, year), "%b %d %Y").ok()
        })
        .collect();

    candidates
        .iter()
        .copied()
        .find(|d| window.contains(*d))
        .or_else(|| candidates.first().copied())
}

fn value_or_na(text: Option<&str>) -> String {
    match text.map(str::trim) {
        None | Some("") | Some("-") => NOT_AVAILABLE.to_string(),
        Some(t) => t.to_string(),
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {:?}", css, e))
}

impl Shapes {
    fn new() -> Result<Self> {
        Ok(Self {
            time: Regex::new(r"(?i)^(\d{1,2}:\d{2}\s*(am|pm)?|all day|tentative|day \d+)$")?,
            value: Regex::new(r"(?i)^(n/a|-|[<>]?[-+]?\d[\d.,]*\s*[%kmbt]?)$")?,
            day: Regex::new(r"([A-Za-z]{3})[a-z]*\s+(\d{1,2})\b")?,
        })
    }
}

impl Cell {
    fn read(td: ElementRef<'_>, link_sel: &Selector) -> Self {
        let text = td.text().collect::<Vec<_>>().join(" ");
        Self {
            class: td.value().attr("class").unwrap_or_default().to_lowercase(),
            text: text.split_whitespace().collect::<Vec<_>>().join(" "),
            html: td.inner_html(),
            has_link: td.select(link_sel).next().is_some(),
        }
    }
}
