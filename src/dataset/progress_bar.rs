//! Progress reporting for dataset iteration (feature `progress`).
//!
//! [`EpochProgress`] drives an `indicatif` bar advanced once per resolved record. Its
//! message shows the time spent resolving the last epoch and a smoothed per-epoch time,
//! `avg ← α·dt + (1–α)·avg` with `α = 0.2`, seeded by the first epoch.
//!
//! The bar only observes the iteration; records are produced the same way with or
//! without it.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{bar:40.cyan/blue} {pos}/{len} epochs ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}";

const SMOOTHING: f64 = 0.2;

/// Progress bar over one iteration pass of a dataset.
pub struct EpochProgress {
    bar: ProgressBar,
    last_step: Instant,
    smoothed: Option<Duration>,
}

impl EpochProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style);
        }
        Self {
            bar,
            last_step: Instant::now(),
            smoothed: None,
        }
    }

    /// Record one resolved epoch.
    pub fn step(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_step);
        self.last_step = now;

        let smoothed = smooth(self.smoothed, elapsed);
        self.smoothed = Some(smoothed);
        self.bar.set_message(format!(
            "epoch {}, avg {}",
            short(elapsed),
            short(smoothed)
        ));
        self.bar.inc(1);
    }

    /// Epochs recorded so far.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn smooth(previous: Option<Duration>, elapsed: Duration) -> Duration {
    match previous {
        None => elapsed,
        Some(avg) => elapsed.mul_f64(SMOOTHING) + avg.mul_f64(1.0 - SMOOTHING),
    }
}

/// Duration with one unit, picked so the number stays readable.
fn short(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{:.1}ms", us as f64 / 1_000.0),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_pick_a_readable_unit() {
        assert_eq!(short(Duration::from_micros(253)), "253µs");
        assert_eq!(short(Duration::from_micros(42_500)), "42.5ms");
        assert_eq!(short(Duration::from_millis(3_140)), "3.14s");
    }

    #[test]
    fn smoothing_is_seeded_by_the_first_epoch() {
        let first = smooth(None, Duration::from_millis(10));
        assert_eq!(first, Duration::from_millis(10));
        let second = smooth(Some(first), Duration::from_millis(20));
        assert!((second.as_secs_f64() - 0.012).abs() < 1e-6);
    }

    #[test]
    fn steps_advance_the_bar() {
        let mut progress = EpochProgress::new(3);
        progress.step();
        progress.step();
        assert_eq!(progress.position(), 2);
        progress.finish();
    }
}
