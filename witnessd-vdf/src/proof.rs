use std::time::{Duration, Instant};

use witnessd_crypto::hash::domain_hash;

use crate::{Error, Parameters, Result};

const VDF_DOMAIN: &str = "witnessd-vdf-v1";

/// One round of the sequential hash chain: `H(domain || state)`.
fn step(state: &[u8; 32]) -> [u8; 32] {
    domain_hash(VDF_DOMAIN, &[state.as_slice()])
}

fn run_chain(input: [u8; 32], iterations: u64) -> [u8; 32] {
    let mut state = input;
    for _ in 0..iterations {
        state = step(&state);
    }
    state
}

/// A completed VDF computation: the input seed, the resulting output, the
/// iteration count actually run, and the measured wall-clock duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proof {
    /// The VDF's starting state.
    pub input: [u8; 32],
    /// The state after `iterations` rounds of `H(domain || state)`.
    pub output: [u8; 32],
    /// The number of hash rounds actually run.
    pub iterations: u64,
    /// The measured wall-clock time the computation took.
    pub wall_duration: Duration,
}

/// Compute a VDF proof: run `iterations := clamp(iterations_per_second *
/// minimum_duration, [min_iterations, max_iterations])` rounds of
/// `H(domain || state)` starting from `input`.
///
/// This call blocks the calling thread for the full duration — callers on
/// an async runtime should run it via `spawn_blocking`.
pub fn compute(input: [u8; 32], minimum_duration: Duration, params: &Parameters) -> Result<Proof> {
    params.validate()?;
    let iterations = params.iterations_for(minimum_duration);
    let started = Instant::now();
    let output = run_chain(input, iterations);
    let wall_duration = started.elapsed();
    Ok(Proof {
        input,
        output,
        iterations,
        wall_duration,
    })
}

/// Re-run the hash chain and compare to `proof.output`.
///
/// Also validates `iterations` against `params`' bounds and logs (but does
/// not fail on) a timing anomaly: claimed wall duration below 0.5x or above
/// 3x the parameter-derived minimum.
pub fn verify(proof: &Proof, params: &Parameters) -> Result<bool> {
    params.validate()?;
    if proof.iterations < params.min_iterations || proof.iterations > params.max_iterations {
        return Err(Error::OutOfBounds {
            actual: proof.iterations,
            min: params.min_iterations,
            max: params.max_iterations,
        });
    }
    check_timing_anomaly(proof, params);
    let recomputed = run_chain(proof.input, proof.iterations);
    Ok(recomputed == proof.output)
}

/// Bounds-check only, trusting the claimed output without recomputation.
/// Cheap; suitable for a first-pass filter ahead of [`verify`].
pub fn quick_verify(proof: &Proof, params: &Parameters) -> Result<()> {
    params.validate()?;
    if proof.iterations < params.min_iterations || proof.iterations > params.max_iterations {
        return Err(Error::OutOfBounds {
            actual: proof.iterations,
            min: params.min_iterations,
            max: params.max_iterations,
        });
    }
    Ok(())
}

/// The wall-clock lower bound this proof's iteration count claims to
/// enforce, purely derived from `params` (no recomputation).
pub fn min_elapsed(proof: &Proof, params: &Parameters) -> Duration {
    params.min_elapsed_for(proof.iterations)
}

fn check_timing_anomaly(proof: &Proof, params: &Parameters) {
    let expected = params.min_elapsed_for(proof.iterations).as_secs_f64();
    if expected <= 0.0 {
        return;
    }
    let ratio = proof.wall_duration.as_secs_f64() / expected;
    if !(0.5..=3.0).contains(&ratio) {
        tracing::warn!(
            ratio,
            claimed_secs = proof.wall_duration.as_secs_f64(),
            expected_secs = expected,
            "VDF proof wall-clock duration is a timing anomaly"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> Parameters {
        Parameters {
            iterations_per_second: 1_000_000,
            min_iterations: 100,
            max_iterations: 10_000,
        }
    }

    #[test]
    fn compute_then_verify_round_trips() {
        let params = fast_params();
        let proof = compute([1u8; 32], Duration::from_millis(0), &params).unwrap();
        assert_eq!(proof.iterations, params.min_iterations);
        assert!(verify(&proof, &params).unwrap());
    }

    #[test]
    fn tampered_output_fails_verification() {
        let params = fast_params();
        let mut proof = compute([2u8; 32], Duration::from_millis(0), &params).unwrap();
        proof.output[0] ^= 0xFF;
        assert!(!verify(&proof, &params).unwrap());
    }

    #[test]
    fn iterations_below_min_rejected() {
        let params = fast_params();
        let mut proof = compute([3u8; 32], Duration::from_millis(0), &params).unwrap();
        proof.iterations = params.min_iterations - 1;
        assert!(matches!(verify(&proof, &params), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn iterations_above_max_rejected() {
        let params = fast_params();
        let mut proof = compute([4u8; 32], Duration::from_millis(0), &params).unwrap();
        proof.iterations = params.max_iterations + 1;
        assert!(matches!(verify(&proof, &params), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn quick_verify_does_not_recompute() {
        let params = fast_params();
        let mut proof = compute([5u8; 32], Duration::from_millis(0), &params).unwrap();
        proof.output = [0xFF; 32]; // tampered, but quick_verify doesn't check it
        assert!(quick_verify(&proof, &params).is_ok());
    }

    #[test]
    fn min_elapsed_is_derived_from_params_not_chain() {
        let params = fast_params();
        let proof = compute([6u8; 32], Duration::from_millis(0), &params).unwrap();
        let expected = Duration::from_secs_f64(proof.iterations as f64 / params.iterations_per_second as f64);
        assert_eq!(min_elapsed(&proof, &params), expected);
    }

    #[test]
    fn chain_is_deterministic() {
        assert_eq!(run_chain([7u8; 32], 50), run_chain([7u8; 32], 50));
        assert_ne!(run_chain([7u8; 32], 50), run_chain([7u8; 32], 51));
    }
}
