use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A uniform random delay window, in seconds. Sampling is half-open: `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A range that always samples to zero. Used to strip pacing in tests.
    #[cfg(test)]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn is_valid(&self) -> bool {
        self.min >= 0.0 && self.max >= self.min && self.max.is_finite()
    }

    pub fn sample_secs(&self) -> f64 {
        // gen_range panics on an empty range
        if self.max <= self.min {
            return self.min.max(0.0);
        }
        rand::thread_rng().gen_range(self.min..self.max)
    }

    pub fn sample(&self) -> Duration {
        Duration::from_secs_f64(self.sample_secs())
    }
}

impl std::fmt::Display for DelayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}-{:.2}s", self.min, self.max)
    }
}

/// `base` seconds shifted by a uniform offset in `[-spread, spread]`, never negative.
pub fn jittered(base: f64, spread: f64) -> Duration {
    let offset = if spread > 0.0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0.0
    };
    Duration::try_from_secs_f64((base + offset).max(0.0)).unwrap_or(Duration::MAX)
}

/// Sleep for a duration sampled from `range`.
pub async fn pause(range: DelayRange) {
    tokio::time::sleep(range.sample()).await;
}

/// Process-wide running flag shared by both loops.
///
/// Loops check [`RunFlag::is_running`] at the top of each iteration and use
/// [`RunFlag::idle`] for the wait between iterations, which returns early once
/// the flag is cleared. Work in progress is never interrupted.
#[derive(Clone)]
pub struct RunFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl RunFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn stop(&self) {
        self.tx.send_replace(false);
    }

    /// Sleep for `duration`, or until the flag is cleared.
    pub async fn idle(&self, duration: Duration) {
        let mut rx = self.tx.subscribe();
        if !*rx.borrow_and_update() {
            return;
        }
        let stopped = async {
            while rx.changed().await.is_ok() {
                if !*rx.borrow_and_update() {
                    break;
                }
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = stopped => {}
        }
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
