//! CLI argument parsing definitions

use bao_bench_config::{LogLevel, ReportFormat};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Weighted multi-endpoint load testing for OpenBao", long_about = None)]
pub struct Cli {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true, value_parser = LogLevel::from_str)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the configured tests, attack the server, clean up and report
    Run(RunArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },

    /// Print the registered test types
    ListTests,
}

/// Flags for `run`. Every flag overrides the configuration file and the
/// environment.
#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Path to the benchmark configuration file
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Server address, e.g. http://127.0.0.1:8200
    #[arg(long, value_name = "URL")]
    pub address: Option<String>,

    /// Client token
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Namespace to run in
    #[arg(long, value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Attack duration, e.g. 30s or 2m
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Requests per second across all workers
    #[arg(long, value_name = "RATE")]
    pub rate: Option<f64>,

    /// Number of concurrent workers
    #[arg(long, value_name = "N")]
    pub workers: Option<u32>,

    /// Create resources under random UUID names (true/false)
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub random_mounts: Option<bool>,

    /// Report format: text, json
    #[arg(long, value_name = "FORMAT", value_parser = ReportFormat::from_str)]
    pub report_format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub report_output: Option<PathBuf>,

    /// Seed for the workers' random number generators
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file without contacting the server
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}
