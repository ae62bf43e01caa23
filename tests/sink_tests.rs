//! CSV feed behaviour on disk: dedup on re-append, later values winning,
//! backups and legacy files.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use ffcal::error::ScrapeError;
use ffcal::models::{EventRecord, Impact, NOT_AVAILABLE};
use ffcal::sink::{backup_path, CsvSink, RecordSink, CSV_HEADERS};
use ffcal::symbols::SymbolMapper;
use tempfile::TempDir;

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn record(ts: NaiveDateTime, title: &str, currency: &str, actual: &str) -> EventRecord {
    EventRecord {
        timestamp: ts,
        title: title.to_string(),
        country: "United States".to_string(),
        currency: currency.to_string(),
        impact: Impact::High,
        actual: actual.to_string(),
        forecast: "141K".to_string(),
        previous: "186K".to_string(),
        notice: None,
    }
}

fn sink_in(dir: &TempDir) -> CsvSink {
    CsvSink::new(
        dir.path().join("output").join("economic_events.csv"),
        SymbolMapper::default(),
    )
}

#[test]
fn appending_the_same_batch_twice_stores_it_once() -> Result<()> {
    let dir = TempDir::new()?;
    let mut sink = sink_in(&dir);
    let batch = vec![
        record(at(5, 13, 15), "ADP Non-Farm Employment Change", "USD", "77K"),
        record(at(5, 15, 0), "ISM Services PMI", "USD", "53.5"),
    ];

    sink.append(&batch)?;
    let once = sink.read_all()?.unwrap();
    sink.append(&batch)?;
    let twice = sink.read_all()?.unwrap();

    assert_eq!(once.len(), 2);
    assert_eq!(once, twice);
    Ok(())
}

#[test]
fn later_append_replaces_matching_record() -> Result<()> {
    let dir = TempDir::new()?;
    let mut sink = sink_in(&dir);

    sink.append(&[record(at(5, 13, 15), "ADP Non-Farm Employment Change", "USD", NOT_AVAILABLE)])?;
    sink.append(&[record(at(5, 13, 15), "ADP Non-Farm Employment Change", "USD", "77K")])?;

    let stored = sink.read_all()?.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].actual, "77K");
    Ok(())
}

#[test]
fn same_title_different_currency_are_distinct() -> Result<()> {
    let dir = TempDir::new()?;
    let mut sink = sink_in(&dir);
    sink.append(&[
        record(at(4, 8, 30), "Trade Balance", "AUD", "6.9B"),
        record(at(4, 8, 30), "Trade Balance", "CAD", "3.1B"),
    ])?;
    assert_eq!(sink.read_all()?.unwrap().len(), 2);
    Ok(())
}

#[test]
fn feed_is_sorted_and_annotated() -> Result<()> {
    let dir = TempDir::new()?;
    let mut sink = sink_in(&dir);
    sink.append(&[record(at(6, 9, 0), "Late", "EUR", "1")])?;
    sink.append(&[record(at(3, 9, 0), "Early", "XYZ", "2")])?;

    let text = std::fs::read_to_string(sink.path())?;
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), CSV_HEADERS.join(","));
    let early = lines.next().unwrap();
    let late = lines.next().unwrap();
    assert!(early.starts_with("2025-03-03 09:00:00,Early"));
    assert!(early.ends_with(",N/A"));
    assert!(late.starts_with("2025-03-06 09:00:00,Late"));
    assert!(late.contains("EURUSD"));
    Ok(())
}

#[test]
fn backup_copies_the_feed_aside() -> Result<()> {
    let dir = TempDir::new()?;
    let mut sink = sink_in(&dir);
    assert_eq!(sink.backup()?, None);

    sink.append(&[record(at(5, 13, 15), "ADP Non-Farm Employment Change", "USD", "77K")])?;
    let copy = sink.backup()?.unwrap();
    assert!(copy.exists());
    assert!(copy
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("economic_events.csv.backup_"));
    assert_eq!(std::fs::read(&copy)?, std::fs::read(sink.path())?);
    Ok(())
}

#[test]
fn backup_name_uses_timestamp() {
    let path = std::path::Path::new("output/economic_events.csv");
    assert_eq!(
        backup_path(path, at(5, 13, 15)),
        std::path::PathBuf::from("output/economic_events.csv.backup_20250305_131500")
    );
}

#[test]
fn legacy_feed_with_presentational_impact_is_read_as_levels() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("legacy.csv");
    std::fs::write(
        &path,
        "DateTime,Event,Country,Impact,Currency,Actual,Forecast,Previous\n\
         2025-03-05 13:15:00,ADP Non-Farm Employment Change,United States,Icon--Ff-Impact-Red,USD,77K,141K,186K\n\
         2025-03-05 15:00:00,Final Services PMI,United States,icon--ff-impact-ora,USD,,,49.7\n",
    )?;

    let stored = CsvSink::new(&path, SymbolMapper::default()).read_all()?.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].impact, Impact::High);
    assert_eq!(stored[1].impact, Impact::Medium);
    assert_eq!(stored[1].actual, NOT_AVAILABLE);
    Ok(())
}

#[test]
fn feed_without_event_column_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("odd.csv");
    std::fs::write(&path, "DateTime,Name\n2025-03-05 13:15:00,Something\n")?;

    let err = CsvSink::new(&path, SymbolMapper::default())
        .read_all()
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<ScrapeError>(), Some(ScrapeError::Sink(_))));
    assert!(err.to_string().contains("no Event column"));
    Ok(())
}

#[test]
fn append_keeps_rows_stored_without_seconds() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("economic_events.csv");
    std::fs::write(
        &path,
        "DateTime,Event,Country,Impact,Currency,Actual,Forecast,Previous,AffectedPairs\n\
         2025-03-04 13:15,Old Event,United States,High,USD,1.0,1.1,0.9,N/A\n\
         2025-03-04T15:00:00,ISM Services PMI,United States,High,USD,53.5,52.6,52.8,N/A\n",
    )?;

    let mut sink = CsvSink::new(&path, SymbolMapper::default());
    sink.append(&[record(at(5, 8, 30), "New", "USD", "77K")])?;

    let stored = sink.read_all()?.unwrap();
    let titles: Vec<&str> = stored.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Old Event", "ISM Services PMI", "New"]);
    assert_eq!(stored[0].timestamp, at(4, 13, 15));

    let text = std::fs::read_to_string(&path)?;
    assert!(text.contains("2025-03-04 13:15:00,Old Event"));
    assert!(text.contains("2025-03-04 15:00:00,ISM Services PMI"));
    Ok(())
}

#[test]
fn unreadable_row_blocks_the_rewrite() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("economic_events.csv");
    let original = "DateTime,Event,Country,Impact,Currency,Actual,Forecast,Previous\n\
                    2025-03-05 13:15:00,ADP Non-Farm Employment Change,United States,High,USD,77K,141K,186K\n\
                    not a date,Hand-edited row,United States,High,USD,,,\n";
    std::fs::write(&path, original)?;

    let mut sink = CsvSink::new(&path, SymbolMapper::default());
    let err = sink
        .append(&[record(at(5, 8, 30), "New", "USD", "77K")])
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<ScrapeError>(), Some(ScrapeError::Sink(_))));
    assert!(err.to_string().contains("line 3"));
    assert!(err.to_string().contains("not a date"));

    assert_eq!(std::fs::read_to_string(&path)?, original);
    Ok(())
}
