//! Batched fetches for providers that cap the number of keys per request.
//!
//! Keys are split into a [`BatchPlan`], batches run with bounded concurrency, and
//! results are merged as batches complete. Dropping the returned future cancels
//! every batch still in flight.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

use futures::stream::{self, StreamExt};

use crate::error::ClientError;

/// Keys partitioned into provider-sized groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan<K> {
    batches: Vec<Vec<K>>,
    concurrency: usize,
}

impl<K> BatchPlan<K>
where
    K: Eq + Hash + Clone,
{
    /// Partition `keys` in input order. Repeated keys are kept once.
    ///
    /// Fails before any request when `max_batch_size` or `concurrency` is zero.
    pub fn new(
        keys: impl IntoIterator<Item = K>,
        max_batch_size: usize,
        concurrency: usize,
    ) -> Result<Self, ClientError> {
        if max_batch_size < 1 {
            return Err(ClientError::invalid_configuration(
                "max batch size must be at least 1",
            ));
        }
        if concurrency < 1 {
            return Err(ClientError::invalid_configuration(
                "batch concurrency must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        let mut batches: Vec<Vec<K>> = Vec::new();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            match batches.last_mut() {
                Some(batch) if batch.len() < max_batch_size => batch.push(key),
                _ => {
                    let mut batch = Vec::with_capacity(max_batch_size);
                    batch.push(key);
                    batches.push(batch);
                }
            }
        }

        Ok(Self {
            batches,
            concurrency,
        })
    }
}

impl<K> BatchPlan<K> {
    pub fn batches(&self) -> &[Vec<K>] {
        &self.batches
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// How a batch failure affects the whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchErrorMode {
    /// The first failed batch aborts the operation and cancels the rest.
    #[default]
    FailFast,
    /// Failed batches are reported next to the merged results.
    Tolerate,
}

/// A batch that failed terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure<K> {
    pub keys: Vec<K>,
    pub error: ClientError,
}

/// Merged results plus the batches that failed under [`BatchErrorMode::Tolerate`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<K, R> {
    pub items: Vec<R>,
    pub failures: Vec<BatchFailure<K>>,
}

impl<K, R> BatchOutcome<K, R> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Plan `keys` and run `fetch` for every batch, failing on the first terminal error.
pub async fn execute_batched<K, R, F, Fut>(
    keys: impl IntoIterator<Item = K>,
    max_batch_size: usize,
    concurrency: usize,
    fetch: F,
) -> Result<Vec<R>, ClientError>
where
    K: Eq + Hash + Clone,
    F: Fn(Vec<K>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, ClientError>>,
{
    let plan = BatchPlan::new(keys, max_batch_size, concurrency)?;
    execute_plan(plan, fetch).await
}

/// Run a prepared plan, failing on the first terminal error.
pub async fn execute_plan<K, R, F, Fut>(plan: BatchPlan<K>, fetch: F) -> Result<Vec<R>, ClientError>
where
    F: Fn(Vec<K>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, ClientError>>,
{
    let concurrency = plan.concurrency;
    let mut results = stream::iter(plan.batches.into_iter().map(&fetch)).buffer_unordered(concurrency);

    let mut merged = Vec::new();
    while let Some(batch) = results.next().await {
        // Returning here drops `results`, cancelling the batches still running.
        merged.extend(batch?);
    }
    Ok(merged)
}

/// Run a prepared plan according to `mode`.
///
/// Under [`BatchErrorMode::FailFast`] the first failure is returned as `Err`; under
/// [`BatchErrorMode::Tolerate`] it is recorded in the outcome and the rest keep going.
pub async fn execute_plan_with<K, R, F, Fut>(
    plan: BatchPlan<K>,
    mode: BatchErrorMode,
    fetch: F,
) -> Result<BatchOutcome<K, R>, ClientError>
where
    K: Clone,
    F: Fn(Vec<K>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, ClientError>>,
{
    let concurrency = plan.concurrency;
    let fetch = &fetch;
    let mut results = stream::iter(plan.batches.into_iter().map(|keys| async move {
        let result = fetch(keys.clone()).await;
        (keys, result)
    }))
    .buffer_unordered(concurrency);

    let mut outcome = BatchOutcome {
        items: Vec::new(),
        failures: Vec::new(),
    };
    while let Some((keys, result)) = results.next().await {
        match (result, mode) {
            (Ok(items), _) => outcome.items.extend(items),
            (Err(error), BatchErrorMode::FailFast) => return Err(error),
            (Err(error), BatchErrorMode::Tolerate) => {
                tracing::warn!(keys = keys.len(), %error, "batch failed, continuing");
                outcome.failures.push(BatchFailure { keys, error });
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::ProviderId;

    #[test]
    fn plan_partitions_in_order() {
        let plan = BatchPlan::new(1..=7, 3, 2).expect("plan");

        assert_eq!(plan.batches(), &[vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
        assert_eq!(plan.key_count(), 7);
    }

    #[test]
    fn plan_drops_repeated_keys() {
        let plan = BatchPlan::new(["a", "b", "a", "c", "b"], 2, 1).expect("plan");

        assert_eq!(plan.batches(), &[vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn plan_of_nothing_is_empty() {
        let plan = BatchPlan::new(Vec::<u32>::new(), 10, 1).expect("plan");
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_fetching() {
        let calls = AtomicUsize::new(0);
        let fetch = |keys: Vec<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ClientError>(keys) }
        };

        let zero_size = execute_batched(1..=3, 0, 1, &fetch).await;
        let zero_concurrency = execute_batched(1..=3, 1, 0, &fetch).await;

        assert!(matches!(zero_size, Err(ClientError::InvalidConfiguration(_))));
        assert!(matches!(
            zero_concurrency,
            Err(ClientError::InvalidConfiguration(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn merges_every_batch_once() {
        let processed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let fetch = |keys: Vec<u32>| {
            let processed = Arc::clone(&processed);
            async move {
                processed.lock().expect("lock").extend(keys.iter().copied());
                Ok::<_, ClientError>(keys.into_iter().map(|key| key * 10).collect::<Vec<_>>())
            }
        };

        let results = execute_batched(1..=25, 4, 3, fetch).await.expect("results");

        let expected: BTreeSet<u32> = (1..=25).map(|key| key * 10).collect();
        assert_eq!(results.len(), 25);
        assert_eq!(results.into_iter().collect::<BTreeSet<_>>(), expected);
        assert_eq!(processed.lock().expect("lock").len(), 25);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let fetch = |keys: Vec<u32>| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ClientError>(keys)
            }
        };

        execute_batched(0..40, 2, 3, fetch).await.expect("results");

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failing_batch_aborts_the_operation() {
        let fetch = |keys: Vec<u32>| async move {
            if keys.contains(&5) {
                Err(ClientError::ServerError {
                    provider: ProviderId::Aligulac,
                    status: 503,
                })
            } else {
                Ok(keys)
            }
        };

        let error = execute_batched(1..=10, 2, 2, fetch)
            .await
            .expect_err("should fail");

        assert_eq!(error.code(), "client.server_error");
    }

    #[tokio::test]
    async fn tolerant_mode_reports_failed_keys() {
        let plan = BatchPlan::new(1..=6, 2, 2).expect("plan");
        let fetch = |keys: Vec<u32>| async move {
            if keys.contains(&3) {
                Err(ClientError::Timeout {
                    provider: ProviderId::Twitch,
                    message: String::from("read timeout"),
                })
            } else {
                Ok(keys)
            }
        };

        let outcome = execute_plan_with(plan, BatchErrorMode::Tolerate, fetch)
            .await
            .expect("tolerated");

        assert!(!outcome.is_complete());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].keys, vec![3, 4]);
        assert_eq!(
            outcome.items.into_iter().collect::<BTreeSet<_>>(),
            BTreeSet::from([1, 2, 5, 6])
        );
    }
}
