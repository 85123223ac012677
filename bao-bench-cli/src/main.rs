//! bao-bench CLI main entry point

use bao_bench_config::{LogLevel, TestDefinition};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use commands::CommandError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), CommandError> {
    let registry = Arc::new(bao_bench_targets::builtin_registry().map_err(anyhow::Error::from)?);

    match cli.command {
        Commands::Run(args) => {
            let config = match commands::load_run_config(&args, cli.log_level) {
                Ok(config) => config,
                Err(e) => {
                    init_fallback_logging(cli.log_level);
                    return Err(e);
                }
            };
            bao_bench_logging::init_logging(&config.logging)?;
            debug!(definitions = ?summarize(&config.tests), "Configuration loaded");

            commands::run_command(&config, registry, args.seed).await?;
            Ok(())
        }
        Commands::Config { config_cmd } => {
            init_fallback_logging(cli.log_level);
            match config_cmd {
                ConfigCommands::Validate { config_file } => {
                    let out = commands::config_validate_command(&registry, &config_file)?;
                    print!("{}", out);
                    Ok(())
                }
                ConfigCommands::Generate { output, force } => {
                    commands::config_generate_command(&output, force)?;
                    println!("Sample configuration written to {}", output.display());
                    Ok(())
                }
            }
        }
        Commands::ListTests => {
            init_fallback_logging(cli.log_level);
            print!("{}", commands::list_tests_command(&registry));
            Ok(())
        }
    }
}

/// Plain stderr logging for commands that run without a loaded configuration
fn init_fallback_logging(level: Option<LogLevel>) {
    let directive = level.unwrap_or_default().as_directive();
    if let Err(e) = bao_bench_logging::init_simple_tracing(directive) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn summarize(tests: &[TestDefinition]) -> Vec<String> {
    tests
        .iter()
        .map(|t| format!("{}:{}x{}", t.resolved_name(), t.test_type, t.weight))
        .collect()
}
