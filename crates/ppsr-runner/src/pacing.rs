//! Human-like pauses between actions.
//!
//! Every pause in the script is a [`PauseRange`]; a [`DelayPolicy`] turns
//! it into a concrete duration. Production uses [`HumanDelay`], tests use
//! [`NoDelay`] so a whole run completes instantly.

use std::time::Duration;

use rand::Rng;

/// Inclusive millisecond range a pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseRange {
    min_ms: u64,
    max_ms: u64,
}

impl PauseRange {
    /// Bounds given in either order are normalized.
    pub const fn new(a: u64, b: u64) -> Self {
        if a <= b {
            Self { min_ms: a, max_ms: b }
        } else {
            Self { min_ms: b, max_ms: a }
        }
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn contains(&self, d: Duration) -> bool {
        d >= self.min() && d <= self.max()
    }
}

/// Picks how long a pause lasts.
pub trait DelayPolicy: Send + Sync {
    fn pick(&self, range: PauseRange) -> Duration;
}

/// Uniformly random within the range.
#[derive(Debug, Default, Clone, Copy)]
pub struct HumanDelay;

impl DelayPolicy for HumanDelay {
    fn pick(&self, range: PauseRange) -> Duration {
        let ms = rand::thread_rng().gen_range(range.min_ms..=range.max_ms);
        Duration::from_millis(ms)
    }
}

/// Never pauses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayPolicy for NoDelay {
    fn pick(&self, _range: PauseRange) -> Duration {
        Duration::ZERO
    }
}

/// Sleep for a duration drawn from `range`.
pub async fn pause(policy: &dyn DelayPolicy, range: PauseRange) {
    let d = policy.pick(range);
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
