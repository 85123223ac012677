//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `BAO_BENCH_*` override could not be parsed
    #[error("environment override error: {0}")]
    Env(String),

    #[error("invalid {domain} configuration: {message}")]
    Domain { domain: String, message: String },
}
