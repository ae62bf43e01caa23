use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{merge_records, RecordSink};
use crate::error::{Result, ScrapeError};
use crate::models::{EventRecord, Impact, NOT_AVAILABLE, UNKNOWN_COUNTRY};
use crate::symbols::SymbolMapper;

pub const CSV_HEADERS: [&str; 9] = [
    "DateTime",
    "Event",
    "Country",
    "Impact",
    "Currency",
    "Actual",
    "Forecast",
    "Previous",
    "AffectedPairs",
];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layouts older or hand-edited feeds use for the DateTime column
const ACCEPTED_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse a stored DateTime, tolerating missing seconds, fractional seconds,
/// a `T` separator and a trailing `Z`
fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    ACCEPTED_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "DateTime")]
    datetime: String,
    #[serde(rename = "Event")]
    event: &'a str,
    #[serde(rename = "Country")]
    country: &'a str,
    #[serde(rename = "Impact")]
    impact: &'static str,
    #[serde(rename = "Currency")]
    currency: &'a str,
    #[serde(rename = "Actual")]
    actual: &'a str,
    #[serde(rename = "Forecast")]
    forecast: &'a str,
    #[serde(rename = "Previous")]
    previous: &'a str,
    #[serde(rename = "AffectedPairs")]
    affected_pairs: String,
}

/// CSV feed on disk, rewritten in full on every append
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    mapper: SymbolMapper,
}

/// `<csv>.backup_YYYYmmdd_HHMMSS` next to the feed
pub fn backup_path(path: &Path, at: NaiveDateTime) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".backup_{}", at.format("%Y%m%d_%H%M%S")));
    PathBuf::from(name)
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, mapper: SymbolMapper) -> Self {
        Self {
            path: path.into(),
            mapper,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the current feed aside; `None` when there is nothing to back up
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = backup_path(&self.path, Local::now().naive_local());
        fs::copy(&self.path, &target)
            .with_context(|| format!("Failed to back up {}", self.path.display()))?;
        info!("Backed up {} to {}", self.path.display(), target.display());
        Ok(Some(target))
    }

    /// Replace the whole feed with `records`, sorted by timestamp
    pub fn rewrite(&self, records: &[EventRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut sorted: Vec<&EventRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.key().cmp(&b.key()));

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        {
            let mut writer = csv::Writer::from_path(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            if sorted.is_empty() {
                writer.write_record(CSV_HEADERS)?;
            }
            for record in sorted {
                writer.serialize(CsvRow {
                    datetime: record.timestamp.format(DATETIME_FORMAT).to_string(),
                    event: &record.title,
                    country: &record.country,
                    impact: record.impact.as_str(),
                    currency: &record.currency,
                    actual: &record.actual,
                    forecast: &record.forecast,
                    previous: &record.previous,
                    affected_pairs: self.mapper.pairs_for(&record.currency).to_string(),
                })?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, records: &[EventRecord]) -> Result<()> {
        let existing = self.read_all()?.unwrap_or_default();
        let before = existing.len();
        let merged = merge_records(existing, records.iter().cloned());
        self.rewrite(&merged)?;
        info!(
            "Saved {} record(s) to {} ({} new, {} total)",
            records.len(),
            self.path.display(),
            merged.len().saturating_sub(before),
            merged.len()
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Option<Vec<EventRecord>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let headers = reader.headers()?.clone();
        for required in ["DateTime", "Event"] {
            if !headers.iter().any(|h| h == required) {
                return Err(ScrapeError::Sink(format!(
                    "{} has no {} column",
                    self.path.display(),
                    required
                ))
                .into());
            }
        }

        let mut records = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let row = result?;
            let field = |name: &str| get_field(&row, &headers, name);

            // A row that cannot be read would be lost on the next rewrite
            let Some(timestamp) = parse_datetime(field("DateTime")) else {
                return Err(ScrapeError::Sink(format!(
                    "{} line {}: unreadable DateTime '{}'; fix or remove the row before writing",
                    self.path.display(),
                    line + 2,
                    field("DateTime")
                ))
                .into());
            };

            records.push(EventRecord {
                timestamp,
                title: field("Event").to_string(),
                country: non_empty_or(field("Country"), UNKNOWN_COUNTRY),
                currency: field("Currency").to_string(),
                // Older feeds may hold presentational tokens here
                impact: Impact::from_indicator(field("Impact")),
                actual: non_empty_or(field("Actual"), NOT_AVAILABLE),
                forecast: non_empty_or(field("Forecast"), NOT_AVAILABLE),
                previous: non_empty_or(field("Previous"), NOT_AVAILABLE),
                notice: None,
            });
        }
        Ok(Some(records))
    }
}

fn get_field<'a>(row: &'a csv::StringRecord, headers: &csv::StringRecord, name: &str) -> &'a str {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|idx| row.get(idx))
        .map(str::trim)
        .unwrap_or("")
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn backup_name_has_timestamp_suffix() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(6, 0, 9)
            .unwrap();
        let path = backup_path(Path::new("output/economic_events.csv"), at);
        assert_eq!(
            path,
            PathBuf::from("output/economic_events.csv.backup_20250305_060009")
        );
    }

    #[test]
    fn reads_legacy_impact_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(
            &path,
            "DateTime,Event,Country,Impact,Currency,Actual,Forecast,Previous,AffectedPairs\n\
             2025-03-05 08:15:00,ADP Non-Farm Employment Change,United States,icon--ff-impact-red,USD,77K,141K,,N/A\n",
        )
        .unwrap();

        let sink = CsvSink::new(&path, SymbolMapper::default());
        let records = sink.read_all().unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].impact, Impact::High);
        assert_eq!(records[0].previous, NOT_AVAILABLE);
    }

    #[test]
    fn datetime_layouts() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(13, 15, 0)
            .unwrap();
        for value in [
            "2025-03-04 13:15:00",
            "2025-03-04 13:15",
            "2025-03-04T13:15:00",
            "2025-03-04T13:15",
            "2025-03-04T13:15:00Z",
            " 2025-03-04 13:15:00.000 ",
        ] {
            assert_eq!(parse_datetime(value), Some(expected), "{}", value);
        }
        assert_eq!(parse_datetime("not-a-date"), None);
        assert_eq!(parse_datetime(""), None);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path().join("absent.csv"), SymbolMapper::default());
        assert!(sink.read_all().unwrap().is_none());
        assert!(sink.backup().unwrap().is_none());
    }

    #[test]
    fn rejects_foreign_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();
        let sink = CsvSink::new(&path, SymbolMapper::default());
        let err = sink.read_all().unwrap_err();
        assert!(err.to_string().contains("no DateTime column"));
    }
}
