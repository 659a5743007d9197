//! Orchestrates a set of [`AnchorProvider`]s: fan-out submission, retry
//! with exponential backoff, a periodic upgrade pass, and priority-ordered
//! verification.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::provider::{AnchorProvider, AnchorRecord, ProviderKind};

/// Exponential backoff parameters for [`Registry::commit_with_retry`].
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per retry (`base * multiplier^k`).
    pub multiplier: f64,
    /// Ceiling on any single retry delay.
    pub max_delay: Duration,
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// The result of a [`Registry::commit`] fan-out: one record per provider
/// that succeeded, and one `(provider_name, error)` pair per provider that
/// failed.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Records from providers that succeeded.
    pub records: Vec<AnchorRecord>,
    /// Errors from providers that failed, paired with the provider name.
    pub errors: Vec<(String, Error)>,
}

/// A registry of enabled anchor providers.
pub struct Registry {
    providers: Vec<Arc<dyn AnchorProvider>>,
    verify_priority: Vec<ProviderKind>,
}

impl Registry {
    /// Build a registry over `providers`, with no verify-priority ordering
    /// (first successfully verifying record wins).
    pub fn new(providers: Vec<Arc<dyn AnchorProvider>>) -> Self {
        Registry {
            providers,
            verify_priority: Vec::new(),
        }
    }

    /// Configure which [`ProviderKind`] to prefer when multiple providers
    /// attest the same hash, highest priority first.
    pub fn with_verify_priority(mut self, order: Vec<ProviderKind>) -> Self {
        self.verify_priority = order;
        self
    }

    /// Submit `hash` concurrently to every enabled provider. Returns
    /// [`Error::AllAnchorsFailed`] only if every provider failed; otherwise
    /// the outcome carries both the successes and the per-provider errors.
    pub async fn commit(&self, hash: [u8; 32], cancel: &CancellationToken) -> Result<CommitOutcome> {
        let handles: Vec<_> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = provider.clone();
                let cancel = cancel.clone();
                let name = provider.name().to_string();
                tokio::spawn(async move { (name, provider.submit(hash, &cancel).await) })
            })
            .collect();

        let mut outcome = CommitOutcome::default();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(record))) => outcome.records.push(record),
                Ok((name, Err(err))) => outcome.errors.push((name, err)),
                Err(join_err) => outcome.errors.push(("<panicked>".into(), Error::ProviderFailed {
                    provider: "<unknown>".into(),
                    message: join_err.to_string(),
                })),
            }
        }

        if outcome.records.is_empty() && !self.providers.is_empty() {
            return Err(Error::AllAnchorsFailed(self.providers.len()));
        }
        Ok(outcome)
    }

    /// Like [`Registry::commit`], but retries providers that failed using
    /// exponential backoff (`base * multiplier^k`, capped at
    /// `max_delay`) until `max_retries` is exhausted or `cancel` fires.
    ///
    /// Only retries if the entire attempt produced zero successes; a
    /// partial success (some providers failed, at least one succeeded) is
    /// returned immediately without retrying the stragglers, since
    /// `commit`'s contract already treats that as success.
    pub async fn commit_with_retry(
        &self,
        hash: [u8; 32],
        cancel: &CancellationToken,
        retry: &RetryConfig,
    ) -> Result<CommitOutcome> {
        let mut attempt = 0;
        loop {
            match self.commit(hash, cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(_err) => {
                    if attempt >= retry.max_retries {
                        return Err(Error::RetriesExhausted(retry.max_retries));
                    }
                    let delay = retry.delay_for(attempt);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Run one pass of the upgrade worker over `records`, returning any
    /// records that a provider reported a stronger commitment for.
    pub async fn upgrade_once(&self, records: &[AnchorRecord], cancel: &CancellationToken) -> Vec<AnchorRecord> {
        let mut upgraded = Vec::new();
        for record in records {
            if let Some(provider) = self.find_provider(record) {
                if let Ok(Some(new_record)) = provider.upgrade(record, cancel).await {
                    upgraded.push(new_record);
                }
            }
        }
        upgraded
    }

    /// Verify every record, returning the best valid one per
    /// `verify_priority` (or first-valid, if no priority was configured).
    /// A record from a provider the registry no longer recognizes degrades
    /// to structural-only verification (non-empty proof bytes).
    pub async fn best_valid(&self, records: &[AnchorRecord]) -> Option<AnchorRecord> {
        let mut valid = Vec::new();
        for record in records {
            let ok = match self.find_provider(record) {
                Some(provider) => provider.verify(record).await.unwrap_or(false),
                None => !record.proof.is_empty(),
            };
            if ok {
                valid.push(record.clone());
            }
        }
        if self.verify_priority.is_empty() {
            return valid.into_iter().next();
        }
        valid.into_iter().min_by_key(|record| {
            self.verify_priority
                .iter()
                .position(|kind| *kind == record.provider)
                .unwrap_or(usize::MAX)
        })
    }

    fn find_provider(&self, record: &AnchorRecord) -> Option<&Arc<dyn AnchorProvider>> {
        self.providers
            .iter()
            .find(|p| p.kind() == record.provider && p.name() == record.provider_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnchorProvider for AlwaysFails {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Beacon
        }
        fn name(&self) -> &str {
            self.name
        }
        async fn submit(&self, _hash: [u8; 32], _cancel: &CancellationToken) -> Result<AnchorRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ProviderFailed {
                provider: self.name.into(),
                message: "simulated failure".into(),
            })
        }
        async fn verify(&self, _record: &AnchorRecord) -> Result<bool> {
            Ok(false)
        }
    }

    struct AlwaysSucceeds {
        name: &'static str,
        kind: ProviderKind,
    }

    #[async_trait]
    impl AnchorProvider for AlwaysSucceeds {
        fn kind(&self) -> ProviderKind {
            self.kind
        }
        fn name(&self) -> &str {
            self.name
        }
        async fn submit(&self, hash: [u8; 32], _cancel: &CancellationToken) -> Result<AnchorRecord> {
            Ok(AnchorRecord {
                provider: self.kind,
                provider_name: self.name.into(),
                hash,
                proof: vec![1, 2, 3],
                confirmed: true,
                submitted_at: Utc::now(),
            })
        }
        async fn verify(&self, _record: &AnchorRecord) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn commit_returns_all_anchors_failed_when_every_provider_fails() {
        let registry = Registry::new(vec![Arc::new(AlwaysFails {
            name: "p1",
            calls: AtomicUsize::new(0),
        })]);
        let cancel = CancellationToken::new();
        let result = registry.commit([1u8; 32], &cancel).await;
        assert!(matches!(result, Err(Error::AllAnchorsFailed(1))));
    }

    #[tokio::test]
    async fn commit_succeeds_with_partial_failures() {
        let registry = Registry::new(vec![
            Arc::new(AlwaysFails {
                name: "p1",
                calls: AtomicUsize::new(0),
            }),
            Arc::new(AlwaysSucceeds {
                name: "p2",
                kind: ProviderKind::Beacon,
            }),
        ]);
        let cancel = CancellationToken::new();
        let outcome = registry.commit([1u8; 32], &cancel).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn commit_with_retry_gives_up_after_max_retries() {
        let registry = Registry::new(vec![Arc::new(AlwaysFails {
            name: "p1",
            calls: AtomicUsize::new(0),
        })]);
        let cancel = CancellationToken::new();
        let retry = RetryConfig {
            base: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(2),
            max_retries: 2,
        };
        let result = registry.commit_with_retry([1u8; 32], &cancel, &retry).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn best_valid_picks_highest_priority_kind() {
        let registry = Registry::new(vec![
            Arc::new(AlwaysSucceeds {
                name: "beacon",
                kind: ProviderKind::Beacon,
            }),
            Arc::new(AlwaysSucceeds {
                name: "tsa",
                kind: ProviderKind::Rfc3161,
            }),
        ])
        .with_verify_priority(vec![ProviderKind::Rfc3161, ProviderKind::Beacon]);

        let records = vec![
            AnchorRecord {
                provider: ProviderKind::Beacon,
                provider_name: "beacon".into(),
                hash: [1u8; 32],
                proof: vec![1],
                confirmed: true,
                submitted_at: Utc::now(),
            },
            AnchorRecord {
                provider: ProviderKind::Rfc3161,
                provider_name: "tsa".into(),
                hash: [1u8; 32],
                proof: vec![1],
                confirmed: true,
                submitted_at: Utc::now(),
            },
        ];

        let best = registry.best_valid(&records).await.unwrap();
        assert_eq!(best.provider, ProviderKind::Rfc3161);
    }

    #[tokio::test]
    async fn unknown_provider_degrades_to_structural_check() {
        let registry = Registry::new(vec![]);
        let record = AnchorRecord {
            provider: ProviderKind::Beacon,
            provider_name: "gone".into(),
            hash: [1u8; 32],
            proof: vec![1],
            confirmed: true,
            submitted_at: Utc::now(),
        };
        let best = registry.best_valid(&[record]).await;
        assert!(best.is_some());
    }
}
