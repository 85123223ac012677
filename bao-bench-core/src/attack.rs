//! Attack driver
//!
//! A pacer task hands out one permit per `1/rate` of elapsed time, never
//! letting more than `workers` permits pile up. Each worker takes a permit,
//! samples an instance with its own RNG, builds and executes the request,
//! and sends the outcome to the collector. When the duration ends or a stop
//! is requested the shutdown coordinator drains in-flight requests for at most
//! the grace period and then forces the rest.

use bao_bench_config::AttackConfig;
use bao_bench_http::VaultClient;
use bao_bench_resilience::{ShutdownCoordinator, ShutdownError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::aggregator::RequestOutcome;
use crate::executor::RequestExecutor;
use crate::lifecycle::BenchmarkInstance;
use crate::sampler::WeightedSampler;

/// Timer resolution floor for the pacer
const MIN_TICK: Duration = Duration::from_millis(1);

/// Counters for one attack, independent of response outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttackSummary {
    /// Requests handed to the executor
    pub requests_sent: u64,
    /// Permits the pacer could not hand out because every worker was busy
    pub missed_permits: u64,
    /// Requests still in flight when the grace period ran out
    pub abandoned: u32,
    /// From start until new requests stopped
    pub attack_duration: Duration,
    /// Time spent draining in-flight requests
    pub drain_duration: Duration,
    /// The attack ended on a stop request rather than the configured duration
    pub stopped_early: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{count} attack worker(s) panicked: {first}")]
    WorkerPanicked { count: usize, first: String },
}

pub struct AttackDriver {
    config: AttackConfig,
    client: VaultClient,
    executor: Arc<dyn RequestExecutor>,
    shutdown: Arc<ShutdownCoordinator>,
    seed: Option<u64>,
}

impl AttackDriver {
    pub fn new(
        config: AttackConfig,
        client: VaultClient,
        executor: Arc<dyn RequestExecutor>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config,
            client,
            executor,
            shutdown,
            seed: None,
        }
    }

    /// Seed worker RNGs deterministically; worker `i` uses `seed + i`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run the attack to completion. `outcomes` is dropped on return, which
    /// closes the channel once every worker has finished.
    pub async fn run(
        &self,
        sampler: Arc<WeightedSampler<BenchmarkInstance>>,
        outcomes: mpsc::Sender<RequestOutcome>,
    ) -> Result<AttackSummary, DriverError> {
        let workers = self.config.workers.max(1) as usize;
        let permits = Arc::new(Semaphore::new(0));
        let sent = Arc::new(AtomicU64::new(0));

        info!(
            rate = self.config.rate,
            workers,
            duration_ms = self.config.duration.as_millis() as u64,
            targets = sampler.len(),
            "starting attack"
        );

        let start = Instant::now();
        let pacer = tokio::spawn(pace(
            self.config.pacing_interval(),
            workers,
            permits.clone(),
            self.shutdown.clone(),
        ));

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            let rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker_id as u64)),
                None => StdRng::from_os_rng(),
            };
            tasks.spawn(
                Worker {
                    id: worker_id,
                    sampler: sampler.clone(),
                    client: self.client.clone(),
                    executor: self.executor.clone(),
                    shutdown: self.shutdown.clone(),
                    permits: permits.clone(),
                    outcomes: outcomes.clone(),
                    sent: sent.clone(),
                    rng,
                }
                .run(),
            );
        }
        drop(outcomes);

        let stopped_early = tokio::select! {
            _ = tokio::time::sleep(self.config.duration) => false,
            _ = self.shutdown.stop_requested() => true,
        };
        let attack_duration = start.elapsed();
        if stopped_early {
            info!(elapsed_ms = attack_duration.as_millis() as u64, "attack stopped early");
        }

        let drain_start = Instant::now();
        let abandoned = match self.shutdown.shutdown_within(self.config.grace_period).await {
            Ok(()) => 0,
            Err(ShutdownError::TasksRemaining(remaining)) => remaining,
            Err(ShutdownError::AlreadyShuttingDown) => {
                warn!("shutdown already in progress");
                0
            }
        };
        // Wake workers parked on a permit
        permits.close();

        let missed_permits = pacer.await.unwrap_or_else(|e| {
            warn!(error = %e, "pacer task failed");
            0
        });

        let mut panics = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                panics.push(e.to_string());
            }
        }
        let drain_duration = drain_start.elapsed();

        if let Some(first) = panics.first() {
            return Err(DriverError::WorkerPanicked {
                count: panics.len(),
                first: first.clone(),
            });
        }

        let summary = AttackSummary {
            requests_sent: sent.load(Ordering::Acquire),
            missed_permits,
            abandoned,
            attack_duration,
            drain_duration,
            stopped_early,
        };
        info!(
            requests = summary.requests_sent,
            abandoned = summary.abandoned,
            missed_permits = summary.missed_permits,
            "attack finished"
        );
        Ok(summary)
    }
}

/// Grant permits in step with elapsed time until shutdown begins. Returns the
/// number of permits dropped because `cap` were already outstanding.
async fn pace(
    interval: Duration,
    cap: usize,
    permits: Arc<Semaphore>,
    shutdown: Arc<ShutdownCoordinator>,
) -> u64 {
    let mut listener = shutdown.subscribe();
    let period = interval.max(MIN_TICK);
    let interval_nanos = interval.as_nanos().max(1);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let start = Instant::now();
    let mut granted: u64 = 0;
    let mut missed: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = listener.stopped() => break,
            _ = ticker.tick() => {
                // One permit is due immediately, then one per interval
                let due = (start.elapsed().as_nanos() / interval_nanos) as u64 + 1;
                let owed = due.saturating_sub(granted);
                if owed == 0 {
                    continue;
                }
                let room = cap.saturating_sub(permits.available_permits()) as u64;
                let grant = owed.min(room);
                if grant > 0 {
                    permits.add_permits(grant as usize);
                }
                missed += owed - grant;
                granted = due;
            }
        }
    }

    if missed > 0 {
        debug!(missed, "workers could not keep up with the requested rate");
    }
    missed
}

struct Worker {
    id: usize,
    sampler: Arc<WeightedSampler<BenchmarkInstance>>,
    client: VaultClient,
    executor: Arc<dyn RequestExecutor>,
    shutdown: Arc<ShutdownCoordinator>,
    permits: Arc<Semaphore>,
    outcomes: mpsc::Sender<RequestOutcome>,
    sent: Arc<AtomicU64>,
    rng: StdRng,
}

impl Worker {
    async fn run(mut self) {
        let mut listener = self.shutdown.subscribe();
        let mut completed: u64 = 0;

        loop {
            if self.shutdown.is_shutting_down() {
                break;
            }

            tokio::select! {
                biased;
                _ = listener.stopped() => break,
                permit = self.permits.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                },
            }

            let instance = self.sampler.next(&mut self.rng);
            let request = instance.bound.target(&self.client, &mut self.rng);
            let test_type = instance.test_type.clone();

            let in_flight = self.shutdown.track();
            self.sent.fetch_add(1, Ordering::AcqRel);
            let started = Instant::now();

            let result = tokio::select! {
                biased;
                _ = listener.forced() => {
                    debug!(worker = self.id, test_type = %test_type, "abandoning in-flight request");
                    break;
                }
                result = self.executor.execute(request) => result,
            };

            let outcome = RequestOutcome::from_result(test_type, started.elapsed(), result);
            let delivered = self.outcomes.send(outcome).await.is_ok();
            drop(in_flight);
            if !delivered {
                warn!(worker = self.id, "outcome collector is gone, stopping worker");
                break;
            }
            completed += 1;
        }

        debug!(worker = self.id, completed, "worker stopped");
    }
}
