//! CLI command implementations

pub mod config;
pub mod list_tests;
pub mod run;

pub use config::*;
pub use list_tests::*;
pub use run::*;

use bao_bench_core::{ConfigError, RunError};
use thiserror::Error;

/// Failure of a command, carrying the process exit status
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommandError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandError::Config(_) => 2,
            CommandError::Run(e) => e.exit_code() as u8,
            CommandError::Other(_) => 1,
        }
    }
}

impl From<bao_bench_config::ConfigError> for CommandError {
    fn from(error: bao_bench_config::ConfigError) -> Self {
        CommandError::Config(ConfigError::Load(error))
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
