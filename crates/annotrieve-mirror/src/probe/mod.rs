//! Bounded-concurrency probe dispatch
//!
//! A probe is any async check run against one remote locator. The dispatcher
//! fans probes out with a fixed in-flight ceiling and keeps only the ones
//! that produced a value; a key missing from the output means the probe
//! failed or the resource was absent.

pub mod freshness;

use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;

pub use freshness::FreshnessProber;

/// One remote locator to probe and the catalog key it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub url: String,
    pub key: String,
}

impl ProbeTarget {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
        }
    }
}

/// Run `probe` over every target with at most `concurrency` in flight.
///
/// The probe receives the whole target; most only look at the url. Output
/// order is unspecified. Targets whose probe returned `None` are
/// omitted.
pub async fn run_bounded<T, F, Fut>(
    targets: Vec<ProbeTarget>,
    concurrency: usize,
    probe: F,
) -> Vec<(String, T)>
where
    F: Fn(ProbeTarget) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let total = targets.len();
    let probe = &probe;

    let results: Vec<(String, T)> = stream::iter(targets)
        .map(|target| async move {
            let key = target.key.clone();
            probe(target).await.map(|value| (key, value))
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|outcome| async move { outcome })
        .collect()
        .await;

    debug!(
        total,
        succeeded = results.len(),
        "Probe batch complete"
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn targets(n: usize) -> Vec<ProbeTarget> {
        (0..n)
            .map(|i| ProbeTarget::new(format!("https://example.org/{}", i), format!("key{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_absent_results_are_omitted() {
        let results = run_bounded(targets(6), 3, |target: ProbeTarget| async move {
            let index: usize = target
                .url
                .rsplit('/')
                .next()
                .and_then(|tail| tail.parse().ok())
                .unwrap_or(1);
            (index % 2 == 0).then_some(index)
        })
        .await;

        let mut keys: Vec<_> = results.iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["key0", "key2", "key4"]);
        assert!(results.iter().all(|(k, v)| k == &format!("key{}", v)));
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_bounded(targets(20), 4, |_target: ProbeTarget| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Some(())
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_makes_progress() {
        let results = run_bounded(targets(2), 0, |_target: ProbeTarget| async { Some(1u8) }).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results = run_bounded(Vec::new(), 5, |_target: ProbeTarget| async { Some(()) }).await;
        assert!(results.is_empty());
    }
}
