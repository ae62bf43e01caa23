//! Record Normalizer
//!
//! Turns extracted `RawEvent`s into canonical `EventRecord`s: a three-level
//! impact, a resolved country and a currency consistent with that country.

use tracing::debug;

use crate::models::{EventRecord, Impact, RawEvent, NOT_AVAILABLE, UNKNOWN_COUNTRY};

/// Country codes used by the calendar's embedded state
const COUNTRY_CODES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("EUR", "Eurozone"),
    ("EZ", "Eurozone"),
    ("GB", "United Kingdom"),
    ("UK", "United Kingdom"),
    ("JP", "Japan"),
    ("CH", "Switzerland"),
    ("AU", "Australia"),
    ("NZ", "New Zealand"),
    ("CA", "Canada"),
    ("CN", "China"),
    ("FR", "France"),
    ("DE", "Germany"),
    ("IT", "Italy"),
    ("ES", "Spain"),
    ("RU", "Russia"),
    ("BR", "Brazil"),
    ("IN", "India"),
    ("MX", "Mexico"),
    ("ZA", "South Africa"),
];

const CURRENCY_COUNTRIES: &[(&str, &str)] = &[
    ("USD", "United States"),
    ("EUR", "Eurozone"),
    ("GBP", "United Kingdom"),
    ("JPY", "Japan"),
    ("CHF", "Switzerland"),
    ("AUD", "Australia"),
    ("NZD", "New Zealand"),
    ("CAD", "Canada"),
    ("CNY", "China"),
];

const COUNTRY_CURRENCIES: &[(&str, &str)] = &[
    ("United States", "USD"),
    ("Eurozone", "EUR"),
    ("France", "EUR"),
    ("Germany", "EUR"),
    ("Italy", "EUR"),
    ("Spain", "EUR"),
    ("United Kingdom", "GBP"),
    ("Japan", "JPY"),
    ("Switzerland", "CHF"),
    ("Australia", "AUD"),
    ("New Zealand", "NZD"),
    ("Canada", "CAD"),
    ("China", "CNY"),
    ("Russia", "RUB"),
    ("Brazil", "BRL"),
    ("India", "INR"),
    ("Mexico", "MXN"),
    ("South Africa", "ZAR"),
];

/// Title fragments per country, checked in order. A fragment ending in a
/// space only matches at the start of the title.
const COUNTRY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "United States",
        &["US ", "United States", "Federal Reserve", "FOMC", "Fed", "Treasury", "Bureau", "Department of"],
    ),
    ("Eurozone", &["EZ ", "Eurozone", "European Central Bank", "ECB", "European", "Euro"]),
    ("United Kingdom", &["UK ", "United Kingdom", "Bank of England", "BOE", "British", "MPC"]),
    ("Japan", &["Japan", "Bank of Japan", "BOJ", "Japanese"]),
    ("Switzerland", &["CH ", "Switzerland", "Swiss National Bank", "SNB", "Swiss"]),
    ("Australia", &["AU ", "Australia", "Reserve Bank of Australia", "RBA", "Australian"]),
    ("New Zealand", &["NZ ", "New Zealand", "Reserve Bank of New Zealand", "RBNZ"]),
    ("Canada", &["CA ", "Canada", "Bank of Canada", "BOC", "Canadian"]),
    ("China", &["CN ", "China", "People's Bank of China", "PBOC", "Chinese"]),
    ("France", &["FR ", "France", "French"]),
    ("Germany", &["DE ", "Germany", "German", "Bundesbank"]),
    ("Italy", &["IT ", "Italy", "Italian"]),
    ("Spain", &["ES ", "Spain", "Spanish"]),
    ("Russia", &["RU ", "Russia", "Russian"]),
    ("Brazil", &["BR ", "Brazil", "Brazilian"]),
    ("India", &["IN ", "India", "Indian", "Reserve Bank of India", "RBI"]),
    ("Mexico", &["MX ", "Mexico", "Mexican"]),
    ("South Africa", &["ZA ", "South Africa", "South African"]),
];

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    let key = key.trim();
    table
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| *v)
}

/// Country name for a calendar country code (`US`, `EZ`, `GB`...)
pub fn country_for_code(code: &str) -> Option<&'static str> {
    lookup(COUNTRY_CODES, code)
}

pub fn country_for_currency(currency: &str) -> Option<&'static str> {
    lookup(CURRENCY_COUNTRIES, currency)
}

/// Canonical currency of a country
pub fn currency_for_country(country: &str) -> Option<&'static str> {
    lookup(COUNTRY_CURRENCIES, country)
}

/// First country whose keyword fragments appear in `title`
pub fn country_from_title(title: &str) -> Option<&'static str> {
    let lowered = title.to_lowercase();
    COUNTRY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords.iter().any(|keyword| {
                let keyword = keyword.to_lowercase();
                if keyword.ends_with(' ') {
                    lowered.starts_with(&keyword)
                } else {
                    lowered.contains(&keyword)
                }
            })
        })
        .map(|(country, _)| *country)
}

fn is_unresolved(country: &str) -> bool {
    let country = country.trim();
    country.is_empty() || country.eq_ignore_ascii_case(UNKNOWN_COUNTRY) || country == NOT_AVAILABLE
}

/// Resolve a country from, in order: a known code, title keywords, the currency
fn resolve_country(country: &str, title: &str, currency: &str) -> String {
    if !is_unresolved(country) {
        return country_for_code(country)
            .map(str::to_string)
            .unwrap_or_else(|| country.trim().to_string());
    }
    country_from_title(title)
        .or_else(|| country_for_currency(currency))
        .unwrap_or(UNKNOWN_COUNTRY)
        .to_string()
}

fn clean_value(value: &str) -> String {
    match value.trim() {
        "" | "-" => NOT_AVAILABLE.to_string(),
        v => v.to_string(),
    }
}

/// Canonicalize one record; `None` when it has no title
pub fn normalize(raw: RawEvent) -> Option<EventRecord> {
    let title = raw.title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return None;
    }

    let mut currency = raw.currency.trim().to_uppercase();
    let country = resolve_country(&raw.country, &title, &currency);

    if !is_unresolved(&country) && !currency.is_empty() {
        if let Some(canonical) = currency_for_country(&country) {
            if canonical != currency {
                debug!(
                    "Currency {} inconsistent with {} for '{}', using {}",
                    currency, country, title, canonical
                );
                currency = canonical.to_string();
            }
        }
    }

    Some(EventRecord {
        timestamp: raw.timestamp,
        impact: Impact::from_hint(raw.impact_hint.as_deref()),
        title,
        country,
        currency,
        actual: clean_value(&raw.actual),
        forecast: clean_value(&raw.forecast),
        previous: clean_value(&raw.previous),
        notice: raw.notice,
    })
}

/// Normalize a batch; also returns how many untitled records were dropped
pub fn normalize_batch(raws: Vec<RawEvent>) -> (Vec<EventRecord>, usize) {
    let total = raws.len();
    let records: Vec<EventRecord> = raws.into_iter().filter_map(normalize).collect();
    let dropped = total - records.len();
    if dropped > 0 {
        debug!("Dropped {} untitled record(s)", dropped);
    }
    (records, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(title: &str) -> RawEvent {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        RawEvent::new(ts, title)
    }

    #[test]
    fn presentational_impact_tokens_are_canonicalized() {
        let mut event = raw("Unemployment Rate");
        event.impact_hint = Some("Icon--Ff-Impact-Ora".to_string());
        assert_eq!(normalize(event).unwrap().impact, Impact::Medium);

        let mut event = raw("Unemployment Rate");
        event.impact_hint = Some("Icon--Ff-Impact-Red".to_string());
        let record = normalize(event).unwrap();
        assert_eq!(record.impact, Impact::High);
        assert_eq!(record.impact.as_str(), "High");

        assert_eq!(normalize(raw("Unemployment Rate")).unwrap().impact, Impact::Low);
    }

    #[test]
    fn untitled_records_are_dropped() {
        assert!(normalize(raw("   ")).is_none());
        let (records, dropped) = normalize_batch(vec![raw(""), raw("CPI m/m"), raw("\t")]);
        assert_eq!(records.len(), 1);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn unknown_country_resolves_from_title_keyword() {
        let mut event = raw("BOJ Policy Rate");
        event.currency = "JPY".to_string();
        assert_eq!(normalize(event).unwrap().country, "Japan");

        let mut event = raw("Swiss National Bank Chairman Speaks");
        event.currency = "CHF".to_string();
        assert_eq!(normalize(event).unwrap().country, "Switzerland");
    }

    #[test]
    fn unknown_country_falls_back_to_currency() {
        let mut event = raw("Retail Sales m/m");
        event.currency = "aud".to_string();
        let record = normalize(event).unwrap();
        assert_eq!(record.country, "Australia");
        assert_eq!(record.currency, "AUD");
    }

    #[test]
    fn unresolvable_country_stays_unknown() {
        let record = normalize(raw("Bank Holiday")).unwrap();
        assert_eq!(record.country, UNKNOWN_COUNTRY);
        assert_eq!(record.currency, "");
    }

    #[test]
    fn prefix_keywords_only_match_at_start() {
        assert_eq!(country_from_title("UK Manufacturing PMI"), Some("United Kingdom"));
        assert_eq!(country_from_title("Trade Balance"), None);
        // "ca " inside a word must not hit Canada
        assert_eq!(country_from_title("Africa Trade Balance"), None);
    }

    #[test]
    fn inconsistent_currency_follows_country() {
        let mut event = raw("German ZEW Economic Sentiment");
        event.country = "DE".to_string();
        event.currency = "USD".to_string();
        let record = normalize(event).unwrap();
        assert_eq!(record.country, "Germany");
        assert_eq!(record.currency, "EUR");
    }

    #[test]
    fn reconciliation_skips_unknown_country() {
        let mut event = raw("Bank Holiday");
        event.currency = "XYZ".to_string();
        let record = normalize(event).unwrap();
        assert_eq!(record.country, UNKNOWN_COUNTRY);
        assert_eq!(record.currency, "XYZ");
    }

    #[test]
    fn dash_values_become_sentinel() {
        let mut event = raw("GDP q/q");
        event.actual = "-".to_string();
        event.forecast = " 0.3% ".to_string();
        let record = normalize(event).unwrap();
        assert_eq!(record.actual, NOT_AVAILABLE);
        assert_eq!(record.forecast, "0.3%");
    }
}
