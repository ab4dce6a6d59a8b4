use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressKind, ProgressSink};
use crate::domain::{EntityRecord, FetchFailure, FetchOutcome};
use crate::error::{DexError, FailureReason};
use crate::pokeapi::DetailFetcher;

pub const DEFAULT_CONCURRENCY: usize = 100;
/// Largest ceiling the permit pool can hold.
pub const MAX_CONCURRENCY: usize = Semaphore::MAX_PERMITS;

/// Everything one dispatch produced: successes in ascending id order plus every failure.
///
/// Every locator lands in exactly one of the two lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub total: usize,
    pub records: Vec<EntityRecord>,
    pub failures: Vec<FetchFailure>,
}

impl DispatchReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn success_count(&self) -> usize {
        self.records.len()
    }
}

/// Runs detail fetches with at most `ceiling` in flight at any instant.
///
/// A new fetch is admitted as soon as a running one finishes, so the window stays full
/// until the input is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct BoundedDispatcher {
    ceiling: usize,
}

impl BoundedDispatcher {
    pub fn new(ceiling: usize) -> Result<Self, DexError> {
        if ceiling == 0 || ceiling > MAX_CONCURRENCY {
            return Err(DexError::InvalidConcurrency(ceiling));
        }
        Ok(Self { ceiling })
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub async fn run<F>(
        &self,
        fetcher: Arc<F>,
        locators: Vec<String>,
        sink: &dyn ProgressSink,
    ) -> DispatchReport
    where
        F: DetailFetcher + 'static,
    {
        let total = locators.len();
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.ceiling));
        let buffer = self.ceiling.min(total.max(1));
        let (tx, mut rx) = mpsc::channel::<(String, FetchOutcome)>(buffer);

        let producer = tokio::spawn(produce(fetcher, locators, permits, tx));

        let mut fetched = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut processed = 0usize;
        while let Some((locator, outcome)) = rx.recv().await {
            processed += 1;
            match outcome {
                FetchOutcome::Success(record) => fetched.push((locator, record)),
                FetchOutcome::Failure(failure) => {
                    warn!(
                        locator = %failure.locator,
                        category = failure.reason.category(),
                        reason = %failure.reason,
                        "fetch failed"
                    );
                    failures.push(failure);
                }
            }
            sink.event(ProgressEvent {
                kind: ProgressKind::Counter { processed, total },
                message: format!("processed {processed}/{total}"),
                elapsed: Some(started.elapsed()),
            });
        }

        if let Err(err) = producer.await {
            warn!(error = %err, "dispatcher producer task did not finish cleanly");
        }
        if processed != total {
            warn!(processed, total, "collector drained fewer outcomes than locators");
        }

        // Ties on id keep the lexically first locator; the rest count as failures.
        fetched.sort_by(|(a_locator, a), (b_locator, b)| {
            a.id.cmp(&b.id).then_with(|| a_locator.cmp(b_locator))
        });
        let mut records: Vec<EntityRecord> = Vec::with_capacity(fetched.len());
        for (locator, record) in fetched {
            if records.last().is_some_and(|kept| kept.id == record.id) {
                warn!(locator = %locator, id = record.id, "duplicate id in fetched records");
                failures.push(FetchFailure {
                    locator,
                    reason: FailureReason::MalformedData(format!("duplicate id {}", record.id)),
                });
            } else {
                records.push(record);
            }
        }
        failures.sort_by(|a, b| a.locator.cmp(&b.locator));

        DispatchReport {
            total,
            records,
            failures,
        }
    }
}

/// Admits one worker per locator as permits free up, then joins them all.
///
/// A worker that panics still accounts for its locator: the failure is reported here.
async fn produce<F>(
    fetcher: Arc<F>,
    locators: Vec<String>,
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<(String, FetchOutcome)>,
) where
    F: DetailFetcher + 'static,
{
    let mut workers = Vec::with_capacity(locators.len());
    for locator in locators {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            warn!("concurrency semaphore closed; stopping admission");
            break;
        };
        let fetcher = Arc::clone(&fetcher);
        let tx = tx.clone();
        let worker_locator = locator.clone();
        let handle = tokio::spawn(async move {
            let outcome = fetcher.fetch_detail(&worker_locator).await;
            drop(permit);
            // The collector only stops once every sender is gone.
            let _ = tx.send((worker_locator, outcome)).await;
        });
        debug!(
            locator = %locator,
            free_slots = permits.available_permits(),
            "admitted"
        );
        workers.push((locator, handle));
    }

    for (locator, handle) in workers {
        if let Err(err) = handle.await {
            let outcome = FetchOutcome::failure(
                locator.clone(),
                FailureReason::NetworkError(format!("worker aborted: {err}")),
            );
            let _ = tx.send((locator, outcome)).await;
        }
    }
}
