//! Timing helpers for batch loops.
//!
//! Components
//! -----------------
//! * [`fmt_dur`] – compact human-readable duration (`"253µs"`, `"42ms"`, `"3.14s"`),
//!   used in log lines.
//! * [`IterTimer`] – per-iteration durations with an exponential moving average,
//!   shown in the folder progress bar (`progress` feature only).
//! * [`folder_progress`] – the styled progress bar over session folders
//!   (`progress` feature only).
//!
//! The moving average follows `ema ← α·dt + (1 − α)·ema`, the first tick
//! initializing it to the first duration.
use std::time::Duration;

#[cfg(feature = "progress")]
use std::time::Instant;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "progress")]
pub struct IterTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

#[cfg(feature = "progress")]
impl IterTimer {
    pub fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    #[inline]
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    #[inline]
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

/// Progress bar over `total` session folders.
#[cfg(feature = "progress")]
pub fn folder_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total.max(1) as u64);
    let style = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} folders ({percent:>3}%) | ETA {eta_precise} | {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

#[inline]
pub fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else {
        let ms = d.as_millis();
        if ms < 1_000 {
            format!("{ms}ms")
        } else {
            format!("{:.2}s", d.as_secs_f32())
        }
    }
}
