//! Logging setup for bao-bench
//!
//! Everything in the workspace logs through `tracing`. This crate installs the
//! process-wide subscriber from the `logging` section of the benchmark
//! configuration. Output goes to stderr so reports written to stdout stay
//! clean.

pub mod init;

pub use bao_bench_config::{LogFormat, LogLevel, LoggingConfig};
pub use init::{build_env_filter, init_logging, init_simple_tracing};
