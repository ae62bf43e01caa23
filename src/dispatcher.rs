//! Command dispatcher that routes parsed clap commands to their handlers.
//!
//! Scraping is blocking browser work, so it runs on tokio's blocking pool
//! while the async side watches for Ctrl-C.

use anyhow::{anyhow, Result};
use chrono::{Duration, Local, NaiveDate};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::{formatters, Cli, Commands, ScrapeArgs};
use crate::config::{Config, Strategy};
use crate::models::{AnnotatedEvent, RawEvent};
use crate::normalize::normalize_batch;
use crate::scheduler;
use crate::scraping::{ChromeSessionFactory, Orchestrator, RunSummary};
use crate::sink::{merge_records, CsvSink, MemorySink, RecordSink};
use crate::symbols::SymbolMapper;

/// Span covered by a `--test` run on each side of today
const TEST_SPAN_DAYS: i64 = 7;

/// Route a parsed command to its handler
pub async fn dispatch_command(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Scrape(args) => dispatch_scrape(args, config, json).await,
        Commands::Daily { date } => dispatch_daily(date, config, json).await,
        Commands::Schedule { run_once } => dispatch_schedule(run_once, config).await,
        Commands::Clean { input, output } => dispatch_clean(input, output, &config, json),
        Commands::Mappings => {
            let mapper = SymbolMapper::from_config(&config.symbol_mapping);
            if json {
                println!("{}", formatters::format_mappings_json(&mapper));
            } else {
                println!("{}", formatters::format_mappings_table(&mapper));
            }
            Ok(())
        }
    }
}

/// Days covered by a range run
pub fn resolve_span(
    args: &ScrapeArgs,
    config: &Config,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let (back, forward) = if args.test {
        (TEST_SPAN_DAYS, TEST_SPAN_DAYS)
    } else {
        (config.scraping.days_back, config.scraping.days_forward)
    };

    let start = args.from.unwrap_or(today - Duration::days(back));
    let end = args.to.unwrap_or(today + Duration::days(forward));
    if start > end {
        return Err(anyhow!("Invalid range: {} is after {}", start, end));
    }
    Ok((start, end))
}

fn chrome_factory(config: &Config) -> ChromeSessionFactory {
    ChromeSessionFactory {
        headless: config.scraping.headless,
        page_load_timeout: config.scraping.page_load_timeout(),
        chrome_path: config.scraping.chrome_path.clone(),
    }
}

fn csv_sink(config: &Config) -> CsvSink {
    CsvSink::new(
        config.output.csv_path.clone(),
        SymbolMapper::from_config(&config.symbol_mapping),
    )
}

/// Sets `stop` on the first Ctrl-C
fn watch_interrupt(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current window before stopping");
            stop.store(true, Ordering::SeqCst);
        }
    });
}

async fn dispatch_scrape(args: ScrapeArgs, config: Config, json: bool) -> Result<()> {
    let (start, end) = resolve_span(&args, &config, Local::now().date_naive())?;
    let months = args.months.unwrap_or(config.scraping.months_per_chunk);
    let day_by_day = args.day_by_day || config.scraping.strategy == Strategy::Daily;
    info!(
        "Scraping {} to {} ({})",
        start,
        end,
        if day_by_day { "day by day" } else { "range windows" }
    );

    let stop = Arc::new(AtomicBool::new(false));
    watch_interrupt(Arc::clone(&stop));

    let summary = tokio::task::spawn_blocking(move || -> Result<RunSummary> {
        let mut sink: Box<dyn RecordSink> = if args.scrape_only {
            Box::new(MemorySink::new())
        } else {
            let sink = csv_sink(&config);
            if args.backup {
                sink.backup()?;
            }
            Box::new(sink)
        };

        let mut orchestrator = Orchestrator::new(Box::new(chrome_factory(&config)), &config.scraping)
            .with_stop_flag(stop);
        if day_by_day {
            orchestrator.scrape_days(start, end, sink.as_mut())
        } else {
            orchestrator.scrape_range(start, end, months, sink.as_mut())
        }
    })
    .await
    .map_err(|e| anyhow!("Scrape task panicked: {}", e))??;

    if json {
        println!("{}", formatters::format_summary_json(&summary));
    } else {
        println!("{}", formatters::format_summary_table(&summary));
    }

    if summary.has_failures() {
        return Err(anyhow!("Scrape {}", summary.status()));
    }
    Ok(())
}

/// Scrape one day and append it to the feed; shared by `daily` and `schedule`
fn run_daily_job(day: NaiveDate, config: &Config) -> Result<Vec<AnnotatedEvent>> {
    let mut orchestrator =
        Orchestrator::new(Box::new(chrome_factory(config)), &config.scraping);
    let records = orchestrator.scrape_single_day(day)?;

    let mut sink = csv_sink(config);
    if !records.is_empty() {
        sink.append(&records)?;
    }
    Ok(SymbolMapper::from_config(&config.symbol_mapping).annotate(&records))
}

async fn dispatch_daily(date: Option<NaiveDate>, config: Config, json: bool) -> Result<()> {
    let day = date.unwrap_or_else(|| Local::now().date_naive());
    info!("Daily scrape for {}", day);

    let events = tokio::task::spawn_blocking(move || run_daily_job(day, &config))
        .await
        .map_err(|e| anyhow!("Daily task panicked: {}", e))??;

    if json {
        println!("{}", formatters::format_events_json(&events));
    } else {
        println!(
            "\n{} {} event(s) for {}\n",
            "📅".cyan().bold(),
            events.len(),
            day
        );
        print!("{}", formatters::format_events_table(&events));
    }
    Ok(())
}

async fn dispatch_schedule(run_once: bool, config: Config) -> Result<()> {
    let run_time = config.scheduler.run_time()?;
    let stop = Arc::new(AtomicBool::new(false));

    let runs = scheduler::run_daily(run_time, run_once, stop, move || {
        let day = Local::now().date_naive();
        let events = run_daily_job(day, &config)?;
        info!("Daily job stored {} event(s) for {}", events.len(), day);
        Ok(())
    })
    .await?;

    println!("{} Scheduler finished after {} run(s)", "✓".green().bold(), runs);
    Ok(())
}

fn dispatch_clean(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    config: &Config,
    json: bool,
) -> Result<()> {
    let mapper = SymbolMapper::from_config(&config.symbol_mapping);
    let input = input.unwrap_or_else(|| config.output.csv_path.clone());
    let output = output.unwrap_or_else(|| input.clone());

    let source = CsvSink::new(&input, mapper.clone());
    let stored = source
        .read_all()?
        .ok_or_else(|| anyhow!("No CSV feed at {}", input.display()))?;
    let read = stored.len();

    let (normalized, dropped) = normalize_batch(stored.into_iter().map(RawEvent::from).collect());
    let cleaned = merge_records(Vec::new(), normalized);
    let duplicates = read - dropped - cleaned.len();

    CsvSink::new(&output, mapper).rewrite(&cleaned)?;

    if json {
        let payload = serde_json::json!({
            "input": input,
            "output": output,
            "read": read,
            "written": cleaned.len(),
            "dropped": dropped,
            "duplicates": duplicates,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "{} Cleaned {}: {} read, {} written, {} untitled dropped, {} duplicate(s) merged",
            "✓".green().bold(),
            output.display(),
            read,
            cleaned.len(),
            dropped,
            duplicates
        );
    }
    Ok(())
}
