//! Output formatting module for CLI display
//!
//! Terminal tables and JSON payloads for run summaries, scraped events and
//! the currency mapping.

use colored::Colorize;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::models::{AnnotatedEvent, Impact};
use crate::scraping::{RunStatus, RunSummary};
use crate::symbols::SymbolMapper;

fn colored_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => status.to_string().green().bold().to_string(),
        RunStatus::CompletedWithFailures => status.to_string().yellow().bold().to_string(),
        RunStatus::Interrupted => status.to_string().red().bold().to_string(),
    }
}

fn colored_impact(impact: Impact) -> String {
    match impact {
        Impact::High => impact.as_str().red().to_string(),
        Impact::Medium => impact.as_str().yellow().to_string(),
        Impact::Low => impact.as_str().bright_black().to_string(),
    }
}

/// Format a run summary for terminal table output
pub fn format_summary_table(summary: &RunSummary) -> String {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "Metric")]
        metric: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let row = |metric, value: usize| SummaryRow {
        metric,
        value: value.to_string(),
    };
    let mut rows = Vec::new();
    if summary.windows_attempted > 0 {
        rows.push(row("Windows attempted", summary.windows_attempted));
        rows.push(row("Windows succeeded", summary.windows_succeeded));
        rows.push(row("Windows failed", summary.windows_failed));
    }
    if summary.days_attempted > 0 || summary.weekend_days_skipped > 0 {
        rows.push(row("Days attempted", summary.days_attempted));
        rows.push(row("Days succeeded", summary.days_succeeded));
        rows.push(row("Days failed", summary.days_failed));
        rows.push(row("Weekend days skipped", summary.weekend_days_skipped));
    }
    rows.push(row("Records persisted", summary.records_persisted));
    rows.push(row("Records dropped", summary.records_dropped));
    if summary.persist_failures > 0 {
        rows.push(row("Persist failures", summary.persist_failures));
    }

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(1..), Alignment::right());

    format!(
        "\n{} Scrape {}\n\n{}\n",
        "📅".cyan().bold(),
        colored_status(summary.status()),
        table
    )
}

/// Format a run summary as JSON
pub fn format_summary_json(summary: &RunSummary) -> String {
    #[derive(Serialize)]
    struct JsonSummary<'a> {
        status: RunStatus,
        #[serde(flatten)]
        counts: &'a RunSummary,
    }

    serde_json::to_string_pretty(&JsonSummary {
        status: summary.status(),
        counts: summary,
    })
    .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Format scraped events for terminal table output
pub fn format_events_table(events: &[AnnotatedEvent]) -> String {
    if events.is_empty() {
        return format!("{} No events listed\n", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct EventRow {
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Cur")]
        currency: String,
        #[tabled(rename = "Impact")]
        impact: String,
        #[tabled(rename = "Event")]
        title: String,
        #[tabled(rename = "Actual")]
        actual: String,
        #[tabled(rename = "Forecast")]
        forecast: String,
        #[tabled(rename = "Previous")]
        previous: String,
        #[tabled(rename = "Pairs")]
        pairs: String,
    }

    let rows: Vec<EventRow> = events
        .iter()
        .map(|annotated| {
            let e = &annotated.event;
            EventRow {
                time: e.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                currency: e.currency.clone(),
                impact: colored_impact(e.impact),
                title: e.title.clone(),
                actual: e.actual.clone(),
                forecast: e.forecast.clone(),
                previous: e.previous.clone(),
                pairs: annotated.affected_pairs.to_string(),
            }
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(4..7), Alignment::right());
    format!("{}\n", table)
}

/// Format scraped events as JSON
pub fn format_events_json(events: &[AnnotatedEvent]) -> String {
    #[derive(Serialize)]
    struct JsonEvent<'a> {
        datetime: String,
        event: &'a str,
        country: &'a str,
        impact: Impact,
        currency: &'a str,
        actual: &'a str,
        forecast: &'a str,
        previous: &'a str,
        affected_pairs: String,
    }

    let payload: Vec<JsonEvent> = events
        .iter()
        .map(|a| JsonEvent {
            datetime: a.event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            event: &a.event.title,
            country: &a.event.country,
            impact: a.event.impact,
            currency: &a.event.currency,
            actual: &a.event.actual,
            forecast: &a.event.forecast,
            previous: &a.event.previous,
            affected_pairs: a.affected_pairs.to_string(),
        })
        .collect();

    serde_json::to_string_pretty(&payload)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Format the effective currency mapping for terminal table output
pub fn format_mappings_table(mapper: &SymbolMapper) -> String {
    #[derive(Tabled)]
    struct MappingRow {
        #[tabled(rename = "Currency")]
        currency: String,
        #[tabled(rename = "Pairs")]
        pairs: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<MappingRow> = mapper
        .all_mappings()
        .into_iter()
        .map(|(currency, pairs)| MappingRow {
            source: if mapper.is_override(&currency) {
                "override".yellow().to_string()
            } else {
                "auto".to_string()
            },
            currency,
            pairs: pairs.join(", "),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    format!("\n{} Currency mappings\n\n{}\n", "💱".cyan().bold(), table)
}

/// Format the effective currency mapping as JSON
pub fn format_mappings_json(mapper: &SymbolMapper) -> String {
    serde_json::to_string_pretty(&mapper.all_mappings())
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_table_lists_failures() {
        colored::control::set_override(false);
        let summary = RunSummary {
            windows_attempted: 3,
            windows_succeeded: 2,
            windows_failed: 1,
            records_persisted: 42,
            ..RunSummary::default()
        };
        let text = format_summary_table(&summary);
        assert!(text.contains("completed with failures"));
        assert!(text.contains("Windows failed"));
        assert!(text.contains("42"));
        assert!(!text.contains("Days attempted"));
    }

    #[test]
    fn summary_json_carries_status() {
        let json = format_summary_json(&RunSummary::default());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "Completed");
        assert_eq!(value["records_persisted"], 0);
    }

    #[test]
    fn empty_events_message() {
        assert!(format_events_table(&[]).contains("No events listed"));
    }

    #[test]
    fn mappings_json_is_a_table() {
        let json = format_mappings_json(&SymbolMapper::default());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["CAD"][0], "USDCAD");
    }
}
