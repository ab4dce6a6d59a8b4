use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use dex_catalog::app::{ProgressEvent, ProgressKind, ProgressSink};
use dex_catalog::dispatch::BoundedDispatcher;
use dex_catalog::domain::{EntityRecord, FetchOutcome};
use dex_catalog::error::FailureReason;
use dex_catalog::output::JsonOutput;
use dex_catalog::pokeapi::DetailFetcher;

fn record(id: u32) -> EntityRecord {
    EntityRecord {
        name: format!("entity-{id}"),
        id,
        types: vec!["normal".to_string()],
        abilities: vec!["run-away".to_string()],
        height: 3,
        weight: 40,
        stats: BTreeMap::from([("hp".to_string(), 35), ("speed".to_string(), 90)]),
        flavor_text: String::new(),
    }
}

fn locators(n: u32) -> Vec<String> {
    (1..=n).map(|id| format!("https://catalog.test/pokemon/{id}/")).collect()
}

fn id_of(locator: &str) -> u32 {
    locator
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

/// Simulated remote: scrambled latency, an in-flight gauge and a set of ids that 404.
struct SimulatedRemote {
    missing: HashSet<u32>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SimulatedRemote {
    fn new(missing: impl IntoIterator<Item = u32>) -> Self {
        Self {
            missing: missing.into_iter().collect(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DetailFetcher for SimulatedRemote {
    async fn fetch_detail(&self, locator: &str) -> FetchOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let id = id_of(locator);
        // Later ids tend to finish first.
        let latency = u64::from((id * 37 + 11) % 17) + u64::from(40 / id.max(1));
        tokio::time::sleep(Duration::from_millis(latency)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.missing.contains(&id) {
            FetchOutcome::failure(locator, FailureReason::NotFound)
        } else {
            FetchOutcome::Success(record(id))
        }
    }
}

struct PanickyRemote;

#[async_trait]
impl DetailFetcher for PanickyRemote {
    async fn fetch_detail(&self, locator: &str) -> FetchOutcome {
        let id = id_of(locator);
        if id == 2 {
            panic!("simulated worker crash");
        }
        FetchOutcome::Success(record(id))
    }
}

#[tokio::test]
async fn output_is_ascending_by_id_regardless_of_completion_order() {
    let remote = Arc::new(SimulatedRemote::new([]));
    let mut input = locators(40);
    input.reverse();

    let report = BoundedDispatcher::new(8)
        .unwrap()
        .run(Arc::clone(&remote), input, &JsonOutput)
        .await;

    let ids: Vec<u32> = report.records.iter().map(|record| record.id).collect();
    assert_eq!(ids, (1..=40).collect::<Vec<_>>());
    assert_eq!(report.failure_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_than_ceiling_in_flight() {
    for (ceiling, n) in [(1, 6), (3, 30), (5, 5), (16, 64)] {
        let remote = Arc::new(SimulatedRemote::new([]));
        let report = BoundedDispatcher::new(ceiling)
            .unwrap()
            .run(Arc::clone(&remote), locators(n), &JsonOutput)
            .await;

        let peak = remote.peak.load(Ordering::SeqCst);
        assert!(peak <= ceiling, "peak {peak} exceeded ceiling {ceiling}");
        assert!(peak >= 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), n as usize);
        assert_eq!(report.success_count(), n as usize);
    }
}

#[tokio::test]
async fn window_is_kept_full() {
    let remote = Arc::new(SimulatedRemote::new([]));
    BoundedDispatcher::new(4)
        .unwrap()
        .run(Arc::clone(&remote), locators(24), &JsonOutput)
        .await;
    assert_eq!(remote.peak.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn one_failure_does_not_sink_the_batch() {
    let remote = Arc::new(SimulatedRemote::new([7]));

    let report = BoundedDispatcher::new(3)
        .unwrap()
        .run(Arc::clone(&remote), locators(10), &JsonOutput)
        .await;

    assert_eq!(report.total, 10);
    assert_eq!(report.success_count(), 9);
    assert_eq!(report.failure_count(), 1);
    assert!(report.records.iter().all(|record| record.id != 7));
    assert_eq!(report.failures[0].locator, "https://catalog.test/pokemon/7/");
    assert_eq!(report.failures[0].reason, FailureReason::NotFound);
}

#[tokio::test]
async fn panicking_worker_is_reported_as_failure() {
    let report = BoundedDispatcher::new(2)
        .unwrap()
        .run(Arc::new(PanickyRemote), locators(4), &JsonOutput)
        .await;

    assert_eq!(report.success_count(), 3);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failures[0].locator, "https://catalog.test/pokemon/2/");
    assert!(matches!(
        report.failures[0].reason,
        FailureReason::NetworkError(_)
    ));
}

/// Keeps every progress event for inspection.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn duplicate_ids_are_counted_as_failures() {
    let remote = Arc::new(SimulatedRemote::new([]));
    let mut input = locators(4);
    input.push("https://catalog.test/pokemon/004/".to_string());

    let report = BoundedDispatcher::new(2)
        .unwrap()
        .run(Arc::clone(&remote), input, &JsonOutput)
        .await;

    assert_eq!(report.total, 5);
    assert_eq!(report.success_count() + report.failure_count(), report.total);
    let ids: Vec<u32> = report.records.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].locator, "https://catalog.test/pokemon/4/");
    assert!(matches!(
        &report.failures[0].reason,
        FailureReason::MalformedData(message) if message.contains("duplicate id 4")
    ));
}

#[tokio::test]
async fn every_outcome_emits_a_counter_event() {
    let remote = Arc::new(SimulatedRemote::new([3]));
    let sink = RecordingSink::default();

    BoundedDispatcher::new(2)
        .unwrap()
        .run(Arc::clone(&remote), locators(5), &sink)
        .await;

    let counters: Vec<(usize, usize)> = sink
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event.kind {
            ProgressKind::Counter { processed, total } => Some((processed, total)),
            ProgressKind::Phase => None,
        })
        .collect();
    assert_eq!(counters, (1..=5).map(|n| (n, 5)).collect::<Vec<_>>());
}
