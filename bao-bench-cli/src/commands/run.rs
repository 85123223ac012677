//! `run`: the full benchmark

use anyhow::Context;
use bao_bench_config::{BenchConfig, ConfigLoader, LogLevel};
use bao_bench_core::{BenchmarkRunner, Report, TestRegistry};
use bao_bench_http::{HttpClientConfig, VaultClient};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{CommandError, CommandResult};
use crate::cli::RunArgs;

/// Layer command line flags over the file and environment
pub fn apply_overrides(config: &mut BenchConfig, args: &RunArgs, log_level: Option<LogLevel>) {
    if let Some(ref address) = args.address {
        config.server.address = address.clone();
    }
    if let Some(ref token) = args.token {
        config.server.token = Some(token.clone());
    }
    if let Some(ref namespace) = args.namespace {
        config.server.namespace = Some(namespace.clone());
    }
    if let Some(duration) = args.duration {
        config.attack.duration = duration;
    }
    if let Some(rate) = args.rate {
        config.attack.rate = rate;
    }
    if let Some(workers) = args.workers {
        config.attack.workers = workers;
    }
    if let Some(random_mounts) = args.random_mounts {
        config.attack.random_mounts = random_mounts;
    }
    if let Some(format) = args.report_format {
        config.report.format = format;
    }
    if let Some(ref output) = args.report_output {
        config.report.output = Some(output.clone());
    }
    if let Some(level) = log_level {
        config.logging.level = level;
    }
}

/// Load, override and validate the configuration for a run
pub fn load_run_config(args: &RunArgs, log_level: Option<LogLevel>) -> CommandResult<BenchConfig> {
    let mut config = ConfigLoader::new().parse_file(&args.config)?;
    apply_overrides(&mut config, args, log_level);
    config.validate_all()?;
    Ok(config)
}

/// Build the runner for `config`
pub fn build_runner(
    config: &BenchConfig,
    registry: Arc<TestRegistry>,
    seed: Option<u64>,
) -> CommandResult<BenchmarkRunner> {
    let http = HttpClientConfig::from(config.http.clone()).for_workers(config.attack.workers as usize);
    let client = VaultClient::from_config(&config.server, &http)
        .context("Failed to create API client")?;

    let mut runner = BenchmarkRunner::new(registry, client);
    if let Some(seed) = seed {
        runner = runner.with_seed(seed);
    }
    Ok(runner)
}

/// Execute a run and write its report. Cleanup warnings never change the
/// outcome.
pub async fn run_command(
    config: &BenchConfig,
    registry: Arc<TestRegistry>,
    seed: Option<u64>,
) -> CommandResult<Report> {
    let runner = build_runner(config, registry, seed)?;

    // The first Ctrl-C ends the attack early; cleanup still runs
    let shutdown = runner.shutdown_handle();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping attack and cleaning up");
            shutdown.request_stop();
        }
    });

    info!(
        address = %config.server.address,
        tests = config.tests.len(),
        rate = config.attack.rate,
        workers = config.attack.workers,
        duration = ?config.attack.duration,
        "Starting benchmark"
    );

    let result = runner.run(&config.attack, &config.tests).await;
    signal_task.abort();

    match result {
        Ok(report) => {
            for warning in &report.warnings {
                warn!("{}", warning);
            }
            report
                .write(&config.report)
                .context("Failed to write report")?;
            Ok(report)
        }
        Err(e) => {
            error!("Benchmark failed: {}", e);
            if let Some(cleanup) = e.cleanup() {
                for warning in cleanup.warnings() {
                    warn!("{}", warning);
                }
            }
            Err(CommandError::Run(e))
        }
    }
}
