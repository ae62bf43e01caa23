//! Daily operating mode loop.
//!
//! Sleeps until the configured local time, runs the daily job on the
//! blocking pool, and repeats. Ctrl-C during the wait stops the loop; a job
//! in flight is allowed to finish.

use anyhow::anyhow;
use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Result;

/// First occurrence of `run_time` strictly after `now`
pub fn next_run_after(now: NaiveDateTime, run_time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(run_time);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

async fn run_job<F>(job: &Arc<F>) -> Result<()>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    let job = Arc::clone(job);
    tokio::task::spawn_blocking(move || (*job)())
        .await
        .map_err(|e| anyhow!("daily job panicked: {}", e))?
}

/// Run `job` every day at `run_time`; returns how many jobs ran.
///
/// With `run_once` the job runs immediately, once. Job failures are logged
/// and the loop keeps going.
pub async fn run_daily<F>(
    run_time: NaiveTime,
    run_once: bool,
    stop: Arc<AtomicBool>,
    job: F,
) -> Result<usize>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    let job = Arc::new(job);

    if run_once {
        info!("Running daily job once");
        run_job(&job).await?;
        return Ok(1);
    }

    let mut runs = 0;
    while !stop.load(Ordering::SeqCst) {
        let now = Local::now().naive_local();
        let next = next_run_after(now, run_time);
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next daily run at {}", next.format("%Y-%m-%d %H:%M"));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received, stopping scheduler");
                stop.store(true, Ordering::SeqCst);
                break;
            }
        }

        match run_job(&job).await {
            Ok(()) => info!("Daily job finished"),
            Err(e) => error!("Daily job failed: {:#}", e),
        }
        runs += 1;
    }

    info!("Scheduler stopped after {} run(s)", runs);
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn next_run_is_today_when_still_ahead() {
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert_eq!(next_run_after(at(5, 59), six), at(6, 0));
    }

    #[test]
    fn next_run_rolls_to_tomorrow() {
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 3, 6)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        assert_eq!(next_run_after(at(6, 0), six), expected);
        assert_eq!(next_run_after(at(23, 30), six), expected);
    }

    #[tokio::test]
    async fn run_once_runs_the_job_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let runs = run_daily(
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            true,
            Arc::new(AtomicBool::new(false)),
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap();
        assert_eq!(runs, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_once_surfaces_job_errors() {
        let result = run_daily(
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            true,
            Arc::new(AtomicBool::new(false)),
            || Err(anyhow!("browser missing")),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn preset_stop_flag_skips_the_loop() {
        let runs = run_daily(
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            false,
            Arc::new(AtomicBool::new(true)),
            || Ok(()),
        )
        .await
        .unwrap();
        assert_eq!(runs, 0);
    }
}
