//! Randomized waits between browser interactions.
//!
//! Every wait in the scrape core is a blocking sleep on the calling thread;
//! nothing runs in the background while we pause.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Longest single wait a config may ask for, in seconds
pub const MAX_WAIT_SECS: f64 = 3600.0;

/// Largest accepted `time_scale`
pub const MAX_TIME_SCALE: f64 = 100.0;

/// A `[min, max]` span of seconds; written as a two-element array in config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct DelayRange {
    min_secs: f64,
    max_secs: f64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min_secs: 0.0,
        max_secs: 0.0,
    };

    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let min_secs = min_secs.max(0.0);
        let max_secs = max_secs.max(0.0);
        if min_secs <= max_secs {
            Self { min_secs, max_secs }
        } else {
            Self {
                min_secs: max_secs,
                max_secs: min_secs,
            }
        }
    }

    pub fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    pub fn min_secs(&self) -> f64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> f64 {
        self.max_secs
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.min_secs * factor, self.max_secs * factor)
    }

    /// Pick a duration uniformly inside the range
    pub fn sample(&self) -> Duration {
        let secs = if self.max_secs > self.min_secs {
            rand::thread_rng().gen_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn check(&self, name: &str) -> Result<(), String> {
        check_secs(&format!("{} min", name), self.min_secs)?;
        check_secs(&format!("{} max", name), self.max_secs)?;
        if self.min_secs > self.max_secs {
            return Err(format!(
                "{}: min {} is greater than max {}",
                name, self.min_secs, self.max_secs
            ));
        }
        Ok(())
    }
}

fn check_secs(name: &str, secs: f64) -> Result<(), String> {
    if !secs.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&secs) {
        return Err(format!(
            "{} must be between 0 and {} seconds, got {}",
            name, MAX_WAIT_SECS, secs
        ));
    }
    Ok(())
}

impl TryFrom<[f64; 2]> for DelayRange {
    type Error = String;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        let range = DelayRange {
            min_secs: value[0],
            max_secs: value[1],
        };
        range.check("delay range")?;
        Ok(range)
    }
}

impl From<DelayRange> for [f64; 2] {
    fn from(value: DelayRange) -> Self {
        [value.min_secs, value.max_secs]
    }
}

/// Timing profile of a scrape run (`[scraping.pacing]` in config)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Before the first navigation attempt
    pub initial_delay: DelayRange,
    /// Before each retry; doubled per extra attempt
    pub retry_delay: DelayRange,
    /// After navigation, before inspecting the page
    pub post_load_wait: DelayRange,
    /// Wait before the late second check for a verification page
    pub settle_wait: DelayRange,
    /// Pauses inside the human behavior simulation
    pub human_pause: DelayRange,
    /// Between embedded-state probes
    pub js_probe_interval: DelayRange,
    pub verification_poll: f64,
    pub verification_max_wait: f64,
    pub delayed_verification_max_wait: f64,
    pub post_verification_wait: f64,
    pub refresh_wait: f64,
    pub recreate_pause: DelayRange,
    /// Between windows in range mode
    pub window_pause: DelayRange,
    /// Between days in day-by-day mode
    pub day_pause: DelayRange,
    /// Multiplier applied to every sleep; poll counts ignore it
    pub time_scale: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            initial_delay: DelayRange::new(3.0, 8.0),
            retry_delay: DelayRange::new(10.0, 20.0),
            post_load_wait: DelayRange::new(8.0, 15.0),
            settle_wait: DelayRange::fixed(20.0),
            human_pause: DelayRange::new(1.0, 3.0),
            js_probe_interval: DelayRange::fixed(0.5),
            verification_poll: 10.0,
            verification_max_wait: 180.0,
            delayed_verification_max_wait: 120.0,
            post_verification_wait: 15.0,
            refresh_wait: 60.0,
            recreate_pause: DelayRange::new(2.0, 5.0),
            window_pause: DelayRange::new(5.0, 15.0),
            day_pause: DelayRange::new(2.0, 5.0),
            time_scale: 1.0,
        }
    }
}

impl Pacing {
    /// Same schedule, no sleeping. Used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            time_scale: 0.0,
            ..Self::default()
        }
    }

    /// Reject waits that are negative, non-finite or longer than [`MAX_WAIT_SECS`]
    pub fn validate(&self) -> Result<(), String> {
        let ranges = [
            ("initial_delay", self.initial_delay),
            ("retry_delay", self.retry_delay),
            ("post_load_wait", self.post_load_wait),
            ("settle_wait", self.settle_wait),
            ("human_pause", self.human_pause),
            ("js_probe_interval", self.js_probe_interval),
            ("recreate_pause", self.recreate_pause),
            ("window_pause", self.window_pause),
            ("day_pause", self.day_pause),
        ];
        for (name, range) in ranges {
            range.check(name)?;
        }

        let waits = [
            ("verification_poll", self.verification_poll),
            ("verification_max_wait", self.verification_max_wait),
            ("delayed_verification_max_wait", self.delayed_verification_max_wait),
            ("post_verification_wait", self.post_verification_wait),
            ("refresh_wait", self.refresh_wait),
        ];
        for (name, secs) in waits {
            check_secs(name, secs)?;
        }

        if !self.time_scale.is_finite() || !(0.0..=MAX_TIME_SCALE).contains(&self.time_scale) {
            return Err(format!(
                "time_scale must be between 0 and {}, got {}",
                MAX_TIME_SCALE, self.time_scale
            ));
        }
        Ok(())
    }

    /// Number of polls that fit into `max_wait` at the configured interval
    pub fn poll_count(&self, max_wait: f64) -> u32 {
        if self.verification_poll <= 0.0 {
            return 1;
        }
        ((max_wait / self.verification_poll).floor() as u32).max(1)
    }

    /// Sleep for a random duration in `range`
    pub fn pause(&self, range: DelayRange) {
        self.sleep(range.sample());
    }

    /// Sleep for a fixed number of seconds
    pub fn pause_secs(&self, secs: f64) {
        self.sleep(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO));
    }

    /// Delay before navigation attempt `attempt` (0-based); grows on retries
    pub fn before_attempt(&self, attempt: u32) -> DelayRange {
        if attempt == 0 {
            self.initial_delay
        } else {
            let growth = 2f64.powi(attempt.saturating_sub(1).min(6) as i32);
            self.retry_delay.scaled(growth)
        }
    }

    fn sleep(&self, duration: Duration) {
        let scaled = Duration::try_from_secs_f64(duration.as_secs_f64() * self.time_scale.max(0.0))
            .unwrap_or(Duration::ZERO);
        if scaled.is_zero() {
            return;
        }
        debug!("Pausing {:.1}s", scaled.as_secs_f64());
        std::thread::sleep(scaled);
    }
}
