use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser, Debug)]
#[command(name = "ffcal")]
#[command(
    version,
    about = "Economic calendar scraper with deduplicated, pair-annotated CSV output"
)]
#[command(
    long_about = "Scrape ForexFactory's economic calendar through a headless browser, normalize the events and keep a deduplicated CSV feed annotated with the forex pairs each currency moves."
)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape a date range and merge it into the CSV feed
    Scrape(ScrapeArgs),

    /// Scrape one day and append it to the CSV feed
    Daily {
        /// Day to scrape (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run the daily scrape every day at the configured time
    Schedule {
        /// Run the daily job now, once, and exit
        #[arg(long)]
        run_once: bool,
    },

    /// Re-normalize and deduplicate an existing CSV feed
    Clean {
        /// Feed to read (default: configured CSV path)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Where to write the cleaned feed (default: overwrite input)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the effective currency to pair mapping
    Mappings,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// First day (YYYY-MM-DD, default today minus days_back)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD, default today plus days_forward)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Months per window (default from config)
    #[arg(long)]
    pub months: Option<u32>,

    /// Short run: one week back and one week forward
    #[arg(long)]
    pub test: bool,

    /// Keep results in memory, do not touch the CSV feed
    #[arg(long)]
    pub scrape_only: bool,

    /// Skip range pages and go day by day
    #[arg(long)]
    pub day_by_day: bool,

    /// Back up the CSV feed before writing
    #[arg(long)]
    pub backup: bool,
}
