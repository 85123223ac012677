//! Runs one benchmark end to end: configure, provision, attack, clean up,
//! report.

use bao_bench_config::{AttackConfig, TestDefinition};
use bao_bench_http::VaultClient;
use bao_bench_resilience::ShutdownCoordinator;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::aggregator::{spawn_collector, Aggregator};
use crate::attack::{AttackDriver, AttackSummary};
use crate::error::{AttackRunError, RunError, RunResult};
use crate::executor::{ReqwestExecutor, RequestExecutor};
use crate::lifecycle::{BenchmarkInstance, LifecycleController};
use crate::registry::TestRegistry;
use crate::report::{Report, RunMetadata, TargetEntry};
use crate::sampler::WeightedSampler;

/// Outcomes buffered per worker before workers wait on the collector
const OUTCOMES_PER_WORKER: usize = 64;

/// Drives a single run. The shutdown coordinator is single-use, so build a new
/// runner for every run.
pub struct BenchmarkRunner {
    registry: Arc<TestRegistry>,
    client: VaultClient,
    executor: Arc<dyn RequestExecutor>,
    shutdown: Arc<ShutdownCoordinator>,
    seed: Option<u64>,
}

impl BenchmarkRunner {
    /// The drain after the attack is bounded by the `grace_period` of the
    /// [`AttackConfig`] passed to [`run`](Self::run).
    pub fn new(registry: Arc<TestRegistry>, client: VaultClient) -> Self {
        let executor = Arc::new(ReqwestExecutor::new(client.http().clone()));
        Self {
            registry,
            client,
            executor,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            seed: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Handle for requesting an early stop, e.g. from a Ctrl-C handler
    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    pub async fn run(&self, attack: &AttackConfig, tests: &[TestDefinition]) -> RunResult<Report> {
        let mut controller = LifecycleController::new(&self.registry, &self.client, attack)
            .with_shutdown(self.shutdown.clone());

        let configured = controller.configure(tests)?;

        if let Err(failure) = controller.provision(configured).await {
            return Err(RunError::Setup {
                index: failure.index,
                name: failure.name,
                test_type: failure.test_type,
                source: failure.error,
                cleanup: failure.cleanup,
            });
        }

        let instances = controller.instances().to_vec();
        controller.mark_attacking();
        let attacked = self.attack(attack, instances).await;

        // Cleanup runs whatever happened during the attack
        let cleanup = controller.cleanup().await;
        if !cleanup.is_clean() {
            warn!(
                failures = cleanup.failures.len(),
                "some resources could not be cleaned up"
            );
        }

        match attacked {
            Ok((metadata, aggregator, summary, targets)) => {
                let report = Report::new(metadata, &aggregator, &summary, targets, cleanup);
                info!(
                    requests = report.overall.requests,
                    success_rate = report.overall.success_rate,
                    "benchmark complete"
                );
                Ok(report)
            }
            Err(source) => Err(RunError::Attack { source, cleanup }),
        }
    }

    async fn attack(
        &self,
        config: &AttackConfig,
        instances: Vec<BenchmarkInstance>,
    ) -> Result<(RunMetadata, Aggregator, AttackSummary, Vec<TargetEntry>), AttackRunError> {
        let sampler = WeightedSampler::new(instances.into_iter().map(|i| (i.weight, i)))?;

        let targets = sampler
            .items()
            .iter()
            .enumerate()
            .map(|(position, instance)| {
                let info = instance.bound.describe();
                TargetEntry {
                    index: instance.index,
                    name: instance.name.clone(),
                    test_type: instance.test_type.to_string(),
                    weight: instance.weight,
                    probability: sampler.probability(position).unwrap_or_default(),
                    method: info.method,
                    path_prefix: info.path_prefix,
                }
            })
            .collect::<Vec<_>>();

        let mut aggregator = Aggregator::new()?;
        for instance in sampler.items() {
            aggregator.register_type(&instance.test_type);
        }

        let workers = config.workers.max(1) as usize;
        let (tx, rx) = mpsc::channel(workers.saturating_mul(OUTCOMES_PER_WORKER));
        let collector = spawn_collector(aggregator, rx);

        let mut driver = AttackDriver::new(
            config.clone(),
            self.client.clone(),
            self.executor.clone(),
            self.shutdown.clone(),
        );
        if let Some(seed) = self.seed {
            driver = driver.with_seed(seed);
        }

        let metadata = RunMetadata::new(self.client.address(), config.rate, config.workers);
        let driven = driver.run(Arc::new(sampler), tx).await;

        // The collector finishes once every worker has dropped its sender
        let aggregator = collector.await?;
        let summary = driven?;

        Ok((metadata, aggregator, summary, targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttackError;
    use crate::executor::ResponseSummary;
    use crate::lifecycle::testing::*;
    use async_trait::async_trait;
    use bao_bench_http::RequestTemplate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestExecutor for CountingExecutor {
        async fn execute(&self, _request: RequestTemplate) -> Result<ResponseSummary, AttackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(ResponseSummary {
                status: 200,
                bytes_in: 16,
            })
        }
    }

    fn attack_config() -> AttackConfig {
        AttackConfig {
            rate: 50.0,
            workers: 2,
            duration: Duration::from_secs(1),
            grace_period: Duration::from_millis(500),
            ..AttackConfig::default()
        }
    }

    #[tokio::test]
    async fn test_setup_failure_is_fatal_after_cleaning_up_prior_instances() {
        let calls = Arc::new(Calls::default());
        let registry = Arc::new(scripted_registry(calls.clone()));
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
        });
        let runner = BenchmarkRunner::new(registry, offline_client())
            .with_executor(executor.clone());

        let tests = vec![
            definition("ok", "one", 1),
            definition("ok", "two", 1),
            definition("fail_setup", "three", 1),
        ];
        let err = runner.run(&attack_config(), &tests).await.unwrap_err();

        assert_eq!(err.exit_code(), 3);
        match &err {
            RunError::Setup { index, cleanup, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(cleanup.attempted, 2);
                assert_eq!(cleanup.succeeded, 2);
            }
            other => panic!("expected setup error, got {}", other),
        }
        assert_eq!(calls.cleaned(), vec!["two", "one"]);
        assert_eq!(calls.setups.load(Ordering::SeqCst), 3);
        // No attack traffic
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_config_error_touches_nothing() {
        let calls = Arc::new(Calls::default());
        let registry = Arc::new(scripted_registry(calls.clone()));
        let runner = BenchmarkRunner::new(registry, offline_client());

        let tests = vec![definition("ok", "one", 1), definition("nope", "two", 1)];
        let err = runner.run(&attack_config(), &tests).await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(err.cleanup().is_none());
        assert_eq!(calls.setups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run_reports_and_cleans_up() {
        let calls = Arc::new(Calls::default());
        let registry = Arc::new(scripted_registry(calls.clone()));
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
        });
        let runner = BenchmarkRunner::new(registry, offline_client())
            .with_executor(executor.clone())
            .with_seed(11);

        let tests = vec![
            definition("ok", "reads", 3),
            definition("gone", "writes", 1),
            definition("stuck", "lists", 1),
        ];
        let report = runner.run(&attack_config(), &tests).await.unwrap();

        assert_eq!(report.requests_sent, executor.calls.load(Ordering::SeqCst) as u64);
        assert_eq!(report.overall.requests, report.requests_sent);
        let per_type_total: u64 = report.per_type.values().map(|s| s.requests).sum();
        assert_eq!(per_type_total, report.overall.requests);
        assert!(report.per_type["ok"].requests > report.per_type["gone"].requests);

        assert_eq!(report.targets.len(), 3);
        assert!((report.targets[0].probability - 0.6).abs() < 1e-9);

        // Cleanup failure is a warning, not an error
        assert_eq!(report.cleanup.attempted, 3);
        assert_eq!(report.cleanup.already_absent, 1);
        assert_eq!(report.cleanup.failures.len(), 1);
        assert!(report.warnings.iter().any(|w| w.contains("lists")));
        assert_eq!(calls.cleaned(), vec!["lists", "writes", "reads"]);
    }

    struct StuckExecutor;

    #[async_trait]
    impl RequestExecutor for StuckExecutor {
        async fn execute(&self, _request: RequestTemplate) -> Result<ResponseSummary, AttackError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(ResponseSummary {
                status: 200,
                bytes_in: 0,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_uses_attack_grace_period() {
        let calls = Arc::new(Calls::default());
        let registry = Arc::new(scripted_registry(calls.clone()));
        let runner =
            BenchmarkRunner::new(registry, offline_client()).with_executor(Arc::new(StuckExecutor));

        let config = AttackConfig {
            duration: Duration::from_millis(500),
            grace_period: Duration::from_millis(100),
            ..attack_config()
        };
        let report = runner
            .run(&config, &[definition("ok", "reads", 1)])
            .await
            .unwrap();

        assert_eq!(report.abandoned, 2);
        assert!(report.drain_seconds < 1.0, "drained for {}s", report.drain_seconds);
        assert_eq!(calls.cleaned(), vec!["reads"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_request_still_cleans_up() {
        let calls = Arc::new(Calls::default());
        let registry = Arc::new(scripted_registry(calls.clone()));
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
        });
        let runner = BenchmarkRunner::new(registry, offline_client())
            .with_executor(executor);

        let shutdown = runner.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            shutdown.request_stop();
        });

        let config = AttackConfig {
            duration: Duration::from_secs(3600),
            ..attack_config()
        };
        let report = runner
            .run(&config, &[definition("ok", "reads", 1)])
            .await
            .unwrap();

        assert!(report.stopped_early);
        assert!(report.attack_seconds < 1.0);
        assert_eq!(calls.cleaned(), vec!["reads"]);
    }
}
