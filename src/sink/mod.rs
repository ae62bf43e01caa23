//! Record sinks: durable, deduplicated storage for normalized events.
//!
//! Every sink keys records on `(timestamp, title, currency)` and keeps the
//! most recently appended version of a record.

mod csv_store;

pub use csv_store::{backup_path, CsvSink, CSV_HEADERS};

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{EventKey, EventRecord};

pub trait RecordSink {
    /// Store `records`, replacing stored records that share their key
    fn append(&mut self, records: &[EventRecord]) -> Result<()>;

    /// Everything stored, sorted by timestamp; `None` when nothing was ever stored
    fn read_all(&self) -> Result<Option<Vec<EventRecord>>>;
}

/// Merge `incoming` over `existing`; later records win. Output is sorted by key.
pub fn merge_records(
    existing: impl IntoIterator<Item = EventRecord>,
    incoming: impl IntoIterator<Item = EventRecord>,
) -> Vec<EventRecord> {
    let mut merged: BTreeMap<EventKey, EventRecord> = BTreeMap::new();
    for record in existing.into_iter().chain(incoming) {
        merged.insert(record.key(), record);
    }
    merged.into_values().collect()
}

/// In-memory sink, used for scrape-only runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Option<BTreeMap<EventKey, EventRecord>>,
    appends: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `append` calls so far
    pub fn append_calls(&self) -> usize {
        self.appends
    }

    pub fn len(&self) -> usize {
        self.records.as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, records: &[EventRecord]) -> Result<()> {
        let stored = self.records.get_or_insert_with(BTreeMap::new);
        for record in records {
            stored.insert(record.key(), record.clone());
        }
        self.appends += 1;
        Ok(())
    }

    fn read_all(&self) -> Result<Option<Vec<EventRecord>>> {
        Ok(self
            .records
            .as_ref()
            .map(|stored| stored.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Impact, NOT_AVAILABLE};
    use chrono::NaiveDate;

    fn record(day: u32, title: &str, actual: &str) -> EventRecord {
        EventRecord {
            timestamp: NaiveDate::from_ymd_opt(2025, 3, day)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            title: title.to_string(),
            country: "United States".to_string(),
            currency: "USD".to_string(),
            impact: Impact::High,
            actual: actual.to_string(),
            forecast: NOT_AVAILABLE.to_string(),
            previous: NOT_AVAILABLE.to_string(),
            notice: None,
        }
    }

    #[test]
    fn merge_keeps_later_and_sorts() {
        let merged = merge_records(
            vec![record(7, "Non-Farm Employment Change", "N/A"), record(5, "ISM Services PMI", "53.5")],
            vec![record(7, "Non-Farm Employment Change", "151K")],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "ISM Services PMI");
        assert_eq!(merged[1].actual, "151K");
    }

    #[test]
    fn memory_sink_starts_empty_and_dedups() {
        let mut sink = MemorySink::new();
        assert!(sink.read_all().unwrap().is_none());

        let batch = vec![record(5, "ISM Services PMI", "53.5")];
        sink.append(&batch).unwrap();
        sink.append(&batch).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.append_calls(), 2);
    }

    #[test]
    fn currency_is_part_of_the_key() {
        let mut eur = record(5, "CPI y/y", "2.2%");
        eur.currency = "EUR".to_string();
        let merged = merge_records(vec![record(5, "CPI y/y", "2.8%")], vec![eur]);
        assert_eq!(merged.len(), 2);
    }
}
