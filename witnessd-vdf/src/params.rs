use std::time::Duration;

use crate::{Error, Result};

/// Calibration and bounds for the sequential-hash VDF.
///
/// `iterations_per_second` should be calibrated on the target machine
/// (roughly: how many `H(domain || state)` rounds it can run per second) so
/// that `min_iterations`/`max_iterations` correspond to meaningful wall-clock
/// bounds rather than arbitrary counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parameters {
    /// Calibrated hash rounds per second on the reference machine.
    pub iterations_per_second: u64,
    /// Floor on `iterations`, regardless of the requested minimum duration.
    pub min_iterations: u64,
    /// Ceiling on `iterations`, regardless of the requested minimum duration.
    pub max_iterations: u64,
}

impl Default for Parameters {
    /// 1M rounds/second, with a 1-second floor and a 5-minute ceiling —
    /// conservative defaults an embedder is expected to recalibrate.
    fn default() -> Self {
        Parameters {
            iterations_per_second: 1_000_000,
            min_iterations: 1_000_000,
            max_iterations: 1_000_000 * 300,
        }
    }
}

impl Parameters {
    /// Validate internal consistency (`min_iterations <= max_iterations`,
    /// both nonzero rates).
    pub fn validate(&self) -> Result<()> {
        if self.iterations_per_second == 0 {
            return Err(Error::InvalidParameters("iterations_per_second must be nonzero".into()));
        }
        if self.min_iterations > self.max_iterations {
            return Err(Error::InvalidParameters(format!(
                "min_iterations {} exceeds max_iterations {}",
                self.min_iterations, self.max_iterations
            )));
        }
        Ok(())
    }

    /// The iteration count for a requested `minimum_duration`, clamped to
    /// `[min_iterations, max_iterations]`.
    pub fn iterations_for(&self, minimum_duration: Duration) -> u64 {
        let requested = (self.iterations_per_second as f64 * minimum_duration.as_secs_f64()).ceil() as u64;
        requested.clamp(self.min_iterations, self.max_iterations)
    }

    /// The wall-clock lower bound a given iteration count claims to enforce.
    pub fn min_elapsed_for(&self, iterations: u64) -> Duration {
        Duration::from_secs_f64(iterations as f64 / self.iterations_per_second as f64)
    }
}
