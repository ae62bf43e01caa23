//! ffcal - ForexFactory economic calendar scraper
//!
//! This library drives a headless browser through the calendar's bot checks,
//! extracts events from the embedded page state and the rendered table,
//! normalizes them, and keeps a deduplicated CSV feed annotated with the
//! forex pairs each currency affects.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod normalize;
pub mod scheduler;
pub mod scraping;
pub mod sink;
pub mod symbols;
