//! Result aggregation
//!
//! Workers send one `RequestOutcome` per completed request over a channel. A
//! single collector task owns the `Aggregator` and records each outcome it
//! receives exactly once, so no statistic is ever shared between tasks.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::AttackError;
use crate::executor::ResponseSummary;

/// Latencies are recorded in microseconds between 1µs and 60s
const LATENCY_LOW_US: u64 = 1;
const LATENCY_HIGH_US: u64 = 60_000_000;
const LATENCY_SIGFIG: u8 = 3;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("failed to create latency histogram: {0}")]
    Histogram(String),
}

/// One completed request, attributed to the test type that built it
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub test_type: Arc<str>,
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<AttackError>,
    pub bytes_in: u64,
}

impl RequestOutcome {
    /// Classify an executor result; 2xx and 3xx responses are successes
    pub fn from_result(
        test_type: Arc<str>,
        latency: Duration,
        result: Result<ResponseSummary, AttackError>,
    ) -> Self {
        match result {
            Ok(response) => Self {
                test_type,
                latency,
                status: Some(response.status),
                error: if (200..400).contains(&response.status) {
                    None
                } else {
                    Some(AttackError::Status(response.status))
                },
                bytes_in: response.bytes_in,
            },
            Err(error) => Self {
                test_type,
                latency,
                status: None,
                error: Some(error),
                bytes_in: 0,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.len() == 0 {
            return Self::default();
        }
        let ms = |us: u64| us as f64 / 1000.0;
        Self {
            min_ms: ms(histogram.min()),
            mean_ms: histogram.mean() / 1000.0,
            p50_ms: ms(histogram.value_at_quantile(0.50)),
            p90_ms: ms(histogram.value_at_quantile(0.90)),
            p95_ms: ms(histogram.value_at_quantile(0.95)),
            p99_ms: ms(histogram.value_at_quantile(0.99)),
            max_ms: ms(histogram.max()),
        }
    }
}

/// Finalized statistics for one test type, or for the whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Fraction of requests that succeeded, 0.0 to 1.0
    pub success_rate: f64,
    /// Completed requests per second of attack time
    pub request_rate: f64,
    /// Successful requests per second of attack time
    pub throughput: f64,
    pub bytes_in: u64,
    pub latency: LatencySummary,
    pub status_codes: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, u64>,
}

#[derive(Debug, Clone)]
struct TypeStats {
    requests: u64,
    successes: u64,
    bytes_in: u64,
    status_codes: BTreeMap<u16, u64>,
    errors: BTreeMap<String, u64>,
    latency: Histogram<u64>,
}

impl TypeStats {
    fn new(latency: Histogram<u64>) -> Self {
        Self {
            requests: 0,
            successes: 0,
            bytes_in: 0,
            status_codes: BTreeMap::new(),
            errors: BTreeMap::new(),
            latency,
        }
    }

    fn record(&mut self, outcome: &RequestOutcome) {
        self.requests += 1;
        self.bytes_in += outcome.bytes_in;
        if let Some(status) = outcome.status {
            *self.status_codes.entry(status).or_default() += 1;
        }
        match &outcome.error {
            None => self.successes += 1,
            Some(error) => *self.errors.entry(error.class()).or_default() += 1,
        }

        let micros = u64::try_from(outcome.latency.as_micros()).unwrap_or(u64::MAX);
        self.latency.saturating_record(micros.max(LATENCY_LOW_US));
    }

    fn summarize(&self, elapsed: Duration) -> TypeSummary {
        let seconds = elapsed.as_secs_f64();
        let per_second = |count: u64| {
            if seconds > 0.0 {
                count as f64 / seconds
            } else {
                0.0
            }
        };

        TypeSummary {
            requests: self.requests,
            successes: self.successes,
            failures: self.requests - self.successes,
            success_rate: if self.requests > 0 {
                self.successes as f64 / self.requests as f64
            } else {
                0.0
            },
            request_rate: per_second(self.requests),
            throughput: per_second(self.successes),
            bytes_in: self.bytes_in,
            latency: LatencySummary::from_histogram(&self.latency),
            status_codes: self
                .status_codes
                .iter()
                .map(|(code, count)| (code.to_string(), *count))
                .collect(),
            errors: self.errors.clone(),
        }
    }
}

pub struct Aggregator {
    empty: Histogram<u64>,
    per_type: BTreeMap<String, TypeStats>,
    overall: TypeStats,
}

impl Aggregator {
    pub fn new() -> Result<Self, AggregatorError> {
        let empty = Histogram::<u64>::new_with_bounds(LATENCY_LOW_US, LATENCY_HIGH_US, LATENCY_SIGFIG)
            .map_err(|e| AggregatorError::Histogram(format!("{:?}", e)))?;
        Ok(Self {
            overall: TypeStats::new(empty.clone()),
            per_type: BTreeMap::new(),
            empty,
        })
    }

    /// Make a type appear in the report even if it never receives a request
    pub fn register_type(&mut self, test_type: &str) {
        if !self.per_type.contains_key(test_type) {
            self.per_type
                .insert(test_type.to_string(), TypeStats::new(self.empty.clone()));
        }
    }

    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.register_type(&outcome.test_type);
        if let Some(stats) = self.per_type.get_mut(&*outcome.test_type) {
            stats.record(outcome);
        }
        self.overall.record(outcome);
    }

    pub fn total_requests(&self) -> u64 {
        self.overall.requests
    }

    pub fn requests_for(&self, test_type: &str) -> u64 {
        self.per_type.get(test_type).map(|s| s.requests).unwrap_or(0)
    }

    pub fn test_types(&self) -> Vec<&str> {
        self.per_type.keys().map(String::as_str).collect()
    }

    /// Per-type and overall summaries over an attack lasting `elapsed`
    pub fn summarize(&self, elapsed: Duration) -> (BTreeMap<String, TypeSummary>, TypeSummary) {
        let per_type = self
            .per_type
            .iter()
            .map(|(test_type, stats)| (test_type.clone(), stats.summarize(elapsed)))
            .collect();
        (per_type, self.overall.summarize(elapsed))
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("types", &self.test_types())
            .field("requests", &self.overall.requests)
            .finish()
    }
}

/// Record outcomes until every sender is dropped, then hand the aggregator
/// back
pub fn spawn_collector(
    mut aggregator: Aggregator,
    mut outcomes: mpsc::Receiver<RequestOutcome>,
) -> JoinHandle<Aggregator> {
    tokio::spawn(async move {
        let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
        progress.tick().await;

        loop {
            tokio::select! {
                outcome = outcomes.recv() => match outcome {
                    Some(outcome) => aggregator.record(&outcome),
                    None => break,
                },
                _ = progress.tick() => {
                    info!(
                        requests = aggregator.overall.requests,
                        failures = aggregator.overall.requests - aggregator.overall.successes,
                        "attack progress"
                    );
                }
            }
        }

        debug!(requests = aggregator.total_requests(), "outcome channel closed");
        aggregator
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outcome(test_type: &str, latency_ms: u64, result: Result<ResponseSummary, AttackError>) -> RequestOutcome {
        RequestOutcome::from_result(Arc::from(test_type), Duration::from_millis(latency_ms), result)
    }

    fn ok(status: u16) -> Result<ResponseSummary, AttackError> {
        Ok(ResponseSummary { status, bytes_in: 10 })
    }

    #[test]
    fn test_outcome_classification() {
        assert!(outcome("kvv2_read", 1, ok(200)).is_success());
        assert!(outcome("kvv2_write", 1, ok(204)).is_success());

        let denied = outcome("kvv2_read", 1, ok(403));
        assert!(!denied.is_success());
        assert_eq!(denied.error, Some(AttackError::Status(403)));
        assert_eq!(denied.status, Some(403));

        let timed_out = outcome("kvv2_read", 1, Err(AttackError::Timeout));
        assert_eq!(timed_out.status, None);
        assert_eq!(timed_out.bytes_in, 0);
    }

    #[test]
    fn test_per_type_attribution() {
        let mut aggregator = Aggregator::new().unwrap();
        aggregator.register_type("acl_policy_read");

        aggregator.record(&outcome("kvv2_read", 2, ok(200)));
        aggregator.record(&outcome("kvv2_read", 4, ok(200)));
        aggregator.record(&outcome("kvv2_read", 6, ok(500)));
        aggregator.record(&outcome("kvv2_write", 8, Err(AttackError::Timeout)));

        assert_eq!(aggregator.total_requests(), 4);
        assert_eq!(aggregator.requests_for("kvv2_read"), 3);
        assert_eq!(aggregator.requests_for("kvv2_write"), 1);
        assert_eq!(aggregator.requests_for("acl_policy_read"), 0);

        let (per_type, overall) = aggregator.summarize(Duration::from_secs(2));
        let reads = &per_type["kvv2_read"];
        assert_eq!(reads.successes, 2);
        assert_eq!(reads.failures, 1);
        assert_eq!(reads.errors["status_500"], 1);
        assert_eq!(reads.status_codes["200"], 2);
        assert_eq!(reads.bytes_in, 30);
        assert!((reads.request_rate - 1.5).abs() < 1e-9);
        assert!((reads.throughput - 1.0).abs() < 1e-9);

        let writes = &per_type["kvv2_write"];
        assert_eq!(writes.errors["timeout"], 1);
        assert!(writes.status_codes.is_empty());

        assert_eq!(per_type["acl_policy_read"], TypeSummary::default());

        assert_eq!(overall.requests, 4);
        assert_eq!(overall.successes, 2);
        assert!((overall.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_latency_percentiles() {
        let mut aggregator = Aggregator::new().unwrap();
        for ms in 1..=100 {
            aggregator.record(&outcome("kvv1_read", ms, ok(200)));
        }

        let (per_type, _) = aggregator.summarize(Duration::from_secs(1));
        let latency = &per_type["kvv1_read"].latency;
        // Three significant digits
        assert!((latency.p50_ms - 50.0).abs() < 0.1, "p50 {}", latency.p50_ms);
        assert!((latency.p99_ms - 99.0).abs() < 0.1, "p99 {}", latency.p99_ms);
        assert!((latency.min_ms - 1.0).abs() < 0.01);
        assert!((latency.max_ms - 100.0).abs() < 0.1);
        assert!((latency.mean_ms - 50.5).abs() < 0.1);
    }

    #[test]
    fn test_out_of_range_latency_is_clamped() {
        let mut aggregator = Aggregator::new().unwrap();
        aggregator.record(&RequestOutcome::from_result(
            Arc::from("mount"),
            Duration::from_secs(600),
            Err(AttackError::Timeout),
        ));
        aggregator.record(&RequestOutcome::from_result(Arc::from("mount"), Duration::ZERO, ok(204)));

        assert_eq!(aggregator.requests_for("mount"), 2);
        let (per_type, _) = aggregator.summarize(Duration::from_secs(1));
        assert!(per_type["mount"].latency.max_ms <= 60_100.0);
    }

    #[test]
    fn test_zero_elapsed_has_no_rates() {
        let mut aggregator = Aggregator::new().unwrap();
        aggregator.record(&outcome("namespace", 1, ok(200)));
        let (_, overall) = aggregator.summarize(Duration::ZERO);
        assert_eq!(overall.request_rate, 0.0);
        assert_eq!(overall.throughput, 0.0);
    }

    #[tokio::test]
    async fn test_collector_returns_after_senders_drop() {
        let (tx, rx) = mpsc::channel(8);
        let collector = spawn_collector(Aggregator::new().unwrap(), rx);

        for _ in 0..20 {
            tx.send(outcome("kvv2_list", 1, ok(200))).await.unwrap();
        }
        drop(tx);

        let aggregator = collector.await.unwrap();
        assert_eq!(aggregator.requests_for("kvv2_list"), 20);
    }

    const TYPES: [&str; 3] = ["kvv2_read", "kvv2_write", "acl_policy_read"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_concurrent_producers_lose_nothing(
            producers in prop::collection::vec(
                prop::collection::vec((0usize..3, any::<bool>()), 0..200),
                1..8,
            )
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            let mut expected = [0u64; 3];
            let mut expected_failures = 0u64;
            for batch in &producers {
                for (type_index, success) in batch {
                    expected[*type_index] += 1;
                    if !success {
                        expected_failures += 1;
                    }
                }
            }

            let aggregator = runtime.block_on(async move {
                let (tx, rx) = mpsc::channel(16);
                let collector = spawn_collector(Aggregator::new().unwrap(), rx);

                let mut handles = Vec::new();
                for batch in producers {
                    let tx = tx.clone();
                    handles.push(tokio::spawn(async move {
                        for (type_index, success) in batch {
                            let result = if success { ok(200) } else { Err(AttackError::Timeout) };
                            tx.send(outcome(TYPES[type_index], 1, result)).await.unwrap();
                            tokio::task::yield_now().await;
                        }
                    }));
                }
                drop(tx);
                for handle in handles {
                    handle.await.unwrap();
                }
                collector.await.unwrap()
            });

            for (i, test_type) in TYPES.iter().enumerate() {
                prop_assert_eq!(aggregator.requests_for(test_type), expected[i]);
            }
            let (_, overall) = aggregator.summarize(Duration::from_secs(1));
            prop_assert_eq!(overall.requests, expected.iter().sum::<u64>());
            prop_assert_eq!(overall.failures, expected_failures);
        }
    }
}
