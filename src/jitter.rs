//! Jitter strategies for retry waits
//!
//! - `None`: wait exactly the base delay.
//! - `Uniform`: pick a whole number of seconds uniformly in `[min, max]`.
//!   The cycle runner uses this for the empty-slot wait so concurrent
//!   sessions do not retry in lock-step.
//!
//! RNG: `rand`'s thread-local RNG by default; deterministic RNGs can be
//! injected via `apply_with_rng`.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter - use exact delay
    None,
    /// Uniform whole seconds between `min_secs` and `max_secs`, inclusive.
    /// Built directly with inverted bounds, the range is read low to high.
    Uniform { min_secs: u64, max_secs: u64 },
}

impl Jitter {
    /// Uniform whole-second jitter. Errors when `min_secs > max_secs`.
    pub fn uniform_secs(min_secs: u64, max_secs: u64) -> Result<Self, &'static str> {
        if min_secs > max_secs {
            return Err("uniform jitter: min must not exceed max");
        }
        Ok(Jitter::Uniform { min_secs, max_secs })
    }

    /// Resolve the delay to wait. `base` is only used by `Jitter::None`.
    pub fn apply(&self, base: Duration) -> Duration {
        let mut rng = rng();
        self.apply_with_rng(base, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing)
    pub fn apply_with_rng<R: Rng>(&self, base: Duration, rng: &mut R) -> Duration {
        match *self {
            Jitter::None => base,
            Jitter::Uniform { min_secs, max_secs } => {
                let (lo, hi) = (min_secs.min(max_secs), min_secs.max(max_secs));
                Duration::from_secs(rng.random_range(lo..=hi))
            }
        }
    }

    /// Inclusive bounds of the delays this strategy can produce.
    pub fn bounds(&self, base: Duration) -> (Duration, Duration) {
        match *self {
            Jitter::None => (base, base),
            Jitter::Uniform { min_secs, max_secs } => (
                Duration::from_secs(min_secs.min(max_secs)),
                Duration::from_secs(min_secs.max(max_secs)),
            ),
        }
    }
}
