use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::proof::{self, Proof};
use crate::{Error, Parameters, Result};

/// How thoroughly to verify a [`Proof`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Bounds-check `iterations` only; trust the claimed output.
    Quick,
    /// Re-execute the full hash chain and compare outputs.
    Full,
}

/// Verify `proof` against `params` using `strategy`, bounding a [`Strategy::Full`]
/// re-execution by `timeout` and `cancel`.
///
/// `cancel` lets a caller abort an in-flight full verification (e.g. on
/// daemon shutdown); `timeout` bounds it independently. Either one firing
/// first wins.
pub async fn verify(
    proof: &Proof,
    params: &Parameters,
    strategy: Strategy,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<bool> {
    match strategy {
        Strategy::Quick => {
            proof::quick_verify(proof, params)?;
            Ok(true)
        }
        Strategy::Full => {
            let proof = *proof;
            let params = *params;
            let task = tokio::task::spawn_blocking(move || proof::verify(&proof, &params));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = tokio::time::timeout(timeout, task) => {
                    match result {
                        Err(_elapsed) => Err(Error::TimedOut),
                        Ok(Err(_join_err)) => Err(Error::Cancelled),
                        Ok(Ok(verify_result)) => verify_result,
                    }
                }
            }
        }
    }
}

/// Verify a batch of independent proofs concurrently under [`Strategy::Full`],
/// returning one result per input proof in order.
pub async fn verify_batch(
    proofs: &[Proof],
    params: &Parameters,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Vec<Result<bool>> {
    let handles: Vec<_> = proofs
        .iter()
        .map(|proof| {
            let proof = *proof;
            let params = *params;
            let timeout = timeout;
            let cancel = cancel.clone();
            tokio::spawn(async move { verify(&proof, &params, Strategy::Full, timeout, &cancel).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or(Err(Error::Cancelled)));
    }
    results
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

    #[tokio::test]
    async fn quick_strategy_trusts_tampered_output() {
        let params = fast_params();
        let mut p = proof::compute([1u8; 32], Duration::from_millis(0), &params).unwrap();
        p.output = [0xAA; 32];
        let cancel = CancellationToken::new();
        let ok = verify(&p, &params, Strategy::Quick, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn full_strategy_rejects_tampered_output() {
        let params = fast_params();
        let mut p = proof::compute([2u8; 32], Duration::from_millis(0), &params).unwrap();
        p.output = [0xAA; 32];
        let cancel = CancellationToken::new();
        let ok = verify(&p, &params, Strategy::Full, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn full_strategy_accepts_genuine_proof() {
        let params = fast_params();
        let p = proof::compute([3u8; 32], Duration::from_millis(0), &params).unwrap();
        let cancel = CancellationToken::new();
        let ok = verify(&p, &params, Strategy::Full, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn full_strategy_honors_cancellation() {
        let params = Parameters {
            iterations_per_second: 1_000,
            min_iterations: 50_000_000,
            max_iterations: 50_000_000,
        };
        let p = Proof {
            input: [4u8; 32],
            output: [0u8; 32],
            iterations: params.min_iterations,
            wall_duration: Duration::from_secs(1),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = verify(&p, &params, Strategy::Full, Duration::from_secs(60), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn batch_verifies_each_independently() {
        let params = fast_params();
        let good = proof::compute([5u8; 32], Duration::from_millis(0), &params).unwrap();
        let mut bad = proof::compute([6u8; 32], Duration::from_millis(0), &params).unwrap();
        bad.output = [0xFF; 32];
        let cancel = CancellationToken::new();
        let results = verify_batch(&[good, bad], &params, Duration::from_secs(5), &cancel).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap());
        assert!(!results[1].as_ref().unwrap());
    }
}
