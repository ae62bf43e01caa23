//! Scrape Orchestrator
//!
//! Walks windows (or single days) in chronological order. Each one gets a
//! fresh session, a navigation, an extraction, normalization and an
//! immediate write to the record sink. A failing window is logged and
//! counted; the run moves on to the next one.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::extract::{CalendarExtractor, Extraction};
use super::navigation::{NavigationController, NavigationOutcome};
use super::pacing::Pacing;
use super::partition::partition;
use super::session::{SessionFactory, SessionManager};
use crate::config::ScrapingConfig;
use crate::error::{Result, ScrapeError};
use crate::models::{is_weekend, DateWindow, EventRecord, RawEvent};
use crate::normalize::normalize_batch;
use crate::sink::RecordSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    CompletedWithFailures,
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithFailures => "completed with failures",
            RunStatus::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// End-of-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub windows_attempted: usize,
    pub windows_succeeded: usize,
    pub windows_failed: usize,
    pub days_attempted: usize,
    pub days_succeeded: usize,
    pub days_failed: usize,
    pub weekend_days_skipped: usize,
    pub records_persisted: usize,
    pub records_dropped: usize,
    pub persist_failures: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.windows_failed > 0 || self.days_failed > 0 || self.persist_failures > 0
    }

    pub fn status(&self) -> RunStatus {
        if self.interrupted {
            RunStatus::Interrupted
        } else if self.has_failures() {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        }
    }
}

/// What came out of one page visit
enum PageResult {
    Extracted(Extraction),
    Failed,
}

/// How a batch of events fared on its way to the sink
enum Persisted {
    Stored,
    Failed,
}

pub struct Orchestrator {
    sessions: SessionManager,
    navigator: NavigationController,
    extractor: CalendarExtractor,
    pacing: Pacing,
    base_url: String,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(factory: Box<dyn SessionFactory>, config: &ScrapingConfig) -> Self {
        let pacing = config.pacing.clone();
        Self {
            sessions: SessionManager::new(factory, pacing.clone()),
            navigator: NavigationController::new(config.retry_attempts, pacing.clone()),
            extractor: CalendarExtractor::new(config.js_probe_attempts, pacing.clone()),
            pacing,
            base_url: config.base_url.trim_end_matches(['?', '/']).to_string(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a stop flag (set from a signal handler); checked before each window/day
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// `?day=mar5.2025`
    pub fn day_url(&self, day: NaiveDate) -> String {
        format!("{}?day={}", self.base_url, url_date(day))
    }

    /// `?range=mar1.2025-mar31.2025`; single-day windows use the day URL
    pub fn window_url(&self, window: &DateWindow) -> String {
        if window.is_single_day() {
            self.day_url(window.start())
        } else {
            format!(
                "{}?range={}-{}",
                self.base_url,
                url_date(window.start()),
                url_date(window.end())
            )
        }
    }

    /// Range mode: windows of at most `months_per_chunk * 30` days, each
    /// persisted as soon as it is scraped. Windows without a calendar are
    /// retried day by day.
    pub fn scrape_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        months_per_chunk: u32,
        sink: &mut dyn RecordSink,
    ) -> Result<RunSummary> {
        let windows = partition(start, end, months_per_chunk);
        info!(
            "Scraping {}..={} in {} window(s)",
            start,
            end,
            windows.len()
        );

        let mut summary = RunSummary::default();
        for (index, window) in windows.iter().enumerate() {
            if self.stop_requested() {
                warn!("Stop requested, not starting window {}", window);
                summary.interrupted = true;
                break;
            }
            if index > 0 {
                self.pacing.pause(self.pacing.window_pause);
            }

            summary.windows_attempted += 1;
            info!("Window {}/{}: {}", index + 1, windows.len(), window);

            let url = self.window_url(window);
            let succeeded = match self.visit(window, &url) {
                PageResult::Extracted(Extraction::MissingCalendar) if !window.is_single_day() => {
                    warn!("[{}] extract: no calendar on range page, going day by day", window);
                    self.run_days(window, sink, &mut summary)?
                }
                PageResult::Extracted(extraction) => {
                    matches!(self.persist(window, extraction, sink, &mut summary), Persisted::Stored)
                }
                PageResult::Failed => false,
            };

            self.ensure_session_possible(window)?;
            if succeeded {
                summary.windows_succeeded += 1;
            } else {
                summary.windows_failed += 1;
            }
        }

        self.log_summary(&summary);
        Ok(summary)
    }

    /// Day-by-day mode over `[start, end]`, skipping weekends
    pub fn scrape_days(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        sink: &mut dyn RecordSink,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if let Some(window) = DateWindow::new(start, end) {
            self.run_days(&window, sink, &mut summary)?;
        }
        self.log_summary(&summary);
        Ok(summary)
    }

    /// Daily mode: one fresh session, one page, normalized records back to the caller
    pub fn scrape_single_day(&mut self, day: NaiveDate) -> Result<Vec<EventRecord>> {
        let window = DateWindow::single_day(day);
        let url = self.day_url(day);

        let mut handle = self.sessions.acquire()?;
        let outcome = self.navigator.navigate(&mut self.sessions, &mut handle, &url);
        let extraction = match outcome {
            NavigationOutcome::Loaded => self.extractor.extract(&handle, &window),
            NavigationOutcome::VerificationExhausted => {
                Err(ScrapeError::VerificationTimeout { url: url.clone() }.into())
            }
            NavigationOutcome::Failed => Err(ScrapeError::NavigationFailed {
                url: url.clone(),
                attempts: self.navigator.retry_attempts(),
            }
            .into()),
        };
        self.sessions.release(&mut handle);

        let events = match extraction? {
            Extraction::Found { events, .. } => events,
            Extraction::Empty | Extraction::MissingCalendar => Vec::new(),
        };
        let (records, dropped) = normalize_batch(events);
        info!(
            "Scraped {} record(s) for {} ({} dropped)",
            records.len(),
            day,
            dropped
        );
        Ok(records)
    }

    /// Days of `window` one by one; returns whether every attempted day succeeded
    fn run_days(
        &mut self,
        window: &DateWindow,
        sink: &mut dyn RecordSink,
        summary: &mut RunSummary,
    ) -> Result<bool> {
        let mut all_ok = true;
        let mut first = true;

        for day in window.days() {
            if is_weekend(day) {
                summary.weekend_days_skipped += 1;
                continue;
            }
            if self.stop_requested() {
                warn!("Stop requested, not starting day {}", day);
                summary.interrupted = true;
                return Ok(false);
            }
            if !first {
                self.pacing.pause(self.pacing.day_pause);
            }
            first = false;

            summary.days_attempted += 1;
            let day_window = DateWindow::single_day(day);
            let url = self.day_url(day);
            let succeeded = match self.visit(&day_window, &url) {
                PageResult::Extracted(extraction) => matches!(
                    self.persist(&day_window, extraction, sink, summary),
                    Persisted::Stored
                ),
                PageResult::Failed => false,
            };

            self.ensure_session_possible(&day_window)?;
            if succeeded {
                summary.days_succeeded += 1;
            } else {
                summary.days_failed += 1;
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    /// Fresh session, navigate, extract, tear the session down
    fn visit(&mut self, window: &DateWindow, url: &str) -> PageResult {
        let mut handle = match self.sessions.acquire() {
            Ok(handle) => handle,
            Err(e) => {
                error!("[{}] session: {}", window, e);
                return PageResult::Failed;
            }
        };

        let outcome = self.navigator.navigate(&mut self.sessions, &mut handle, url);
        let result = if outcome.is_loaded() {
            match self.extractor.extract(&handle, window) {
                Ok(extraction) => PageResult::Extracted(extraction),
                Err(e) => {
                    error!("[{}] extract: {:#}", window, e);
                    PageResult::Failed
                }
            }
        } else {
            error!("[{}] navigate: {:?} for {}", window, outcome, url);
            PageResult::Failed
        };

        // Next window starts with new cookies and a new fingerprint
        self.sessions.release(&mut handle);
        result
    }

    fn persist(
        &self,
        window: &DateWindow,
        extraction: Extraction,
        sink: &mut dyn RecordSink,
        summary: &mut RunSummary,
    ) -> Persisted {
        let (events, extract_dropped): (Vec<RawEvent>, usize) = match extraction {
            Extraction::Found {
                events, dropped, ..
            } => (events, dropped),
            Extraction::Empty | Extraction::MissingCalendar => (Vec::new(), 0),
        };

        let (records, normalize_dropped) = normalize_batch(events);
        summary.records_dropped += extract_dropped + normalize_dropped;
        if records.is_empty() {
            info!("[{}] no events to persist", window);
            return Persisted::Stored;
        }

        match sink.append(&records) {
            Ok(()) => {
                summary.records_persisted += records.len();
                info!("[{}] persisted {} record(s)", window, records.len());
                Persisted::Stored
            }
            Err(e) => {
                summary.persist_failures += 1;
                error!("[{}] persist: {:#}", window, e);
                Persisted::Failed
            }
        }
    }

    /// A run that never managed to start a browser is fatal
    fn ensure_session_possible(&self, window: &DateWindow) -> Result<()> {
        if self.sessions.sessions_created() == 0 {
            return Err(ScrapeError::NoSessionAvailable {
                start: window.start(),
                end: window.end(),
            }
            .into());
        }
        Ok(())
    }

    fn log_summary(&self, summary: &RunSummary) {
        info!(
            "Run {}: windows {}/{} ok, days {}/{} ok, {} weekend day(s) skipped, {} record(s) persisted, {} dropped",
            summary.status(),
            summary.windows_succeeded,
            summary.windows_attempted,
            summary.days_succeeded,
            summary.days_attempted,
            summary.weekend_days_skipped,
            summary.records_persisted,
            summary.records_dropped
        );
    }
}

/// `mar5.2025`
pub fn url_date(day: NaiveDate) -> String {
    format!(
        "{}{}.{}",
        day.format("%b").to_string().to_lowercase(),
        day.day(),
        day.year()
    )
}
