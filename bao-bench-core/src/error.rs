//! Error types for benchmark orchestration

use bao_bench_http::HttpError;
use thiserror::Error;

use crate::aggregator::AggregatorError;
use crate::attack::DriverError;
use crate::lifecycle::CleanupSummary;

/// Fatal problems with the test definition set, detected before any server
/// resource is created
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("at least one test definition is required")]
    Empty,

    #[error("tests[{index}] ({test_type}): weight must be greater than 0")]
    ZeroWeight { index: usize, test_type: String },

    #[error("tests[{index}]: unknown test type '{test_type}' (registered: {})", known.join(", "))]
    UnknownTestType {
        index: usize,
        test_type: String,
        known: Vec<String>,
    },

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to decode test configuration: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// A collaborator rejected its own configuration block
    #[error("tests[{index}] '{name}' ({test_type}): {source}")]
    Definition {
        index: usize,
        name: String,
        test_type: String,
        source: Box<ConfigError>,
    },

    #[error(transparent)]
    Load(#[from] bao_bench_config::ConfigError),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A collaborator could not provision its server-side resources
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("{step}: {source}")]
    Api { step: String, source: HttpError },

    #[error("{0}")]
    Failed(String),

    #[error("setup interrupted by stop request")]
    Cancelled,
}

impl SetupError {
    /// Wrap an API failure with the setup step that issued it
    pub fn api(step: impl Into<String>, source: HttpError) -> Self {
        SetupError::Api {
            step: step.into(),
            source,
        }
    }
}

/// Removing a provisioned resource failed
#[derive(Error, Debug)]
pub enum CleanupError {
    /// The resource is already gone; cleanup treats this as done
    #[error("{resource} was already removed")]
    NotFound { resource: String },

    #[error("failed to remove {resource}: {source}")]
    Api { resource: String, source: HttpError },

    #[error("{0}")]
    Failed(String),
}

impl CleanupError {
    /// Classify an API failure, mapping 404 to `NotFound`
    pub fn from_http(resource: impl Into<String>, source: HttpError) -> Self {
        let resource = resource.into();
        if source.is_not_found() {
            CleanupError::NotFound { resource }
        } else {
            CleanupError::Api { resource, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CleanupError::NotFound { .. })
    }
}

/// Why a single attack request did not produce a successful response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttackError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl AttackError {
    /// Stable class name used as the failure bucket in reports
    pub fn class(&self) -> String {
        match self {
            AttackError::Timeout => "timeout".to_string(),
            AttackError::Connect(_) => "connect".to_string(),
            AttackError::Status(code) => format!("status_{}", code),
            AttackError::Transport(_) => "transport".to_string(),
            AttackError::Body(_) => "body".to_string(),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            AttackError::Timeout
        } else if error.is_connect() {
            AttackError::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            AttackError::Body(error.to_string())
        } else {
            AttackError::Transport(error.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("cannot sample from an empty set of targets")]
    Empty,

    #[error("target {index} has weight 0")]
    ZeroWeight { index: usize },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("test type '{0}' is already registered")]
    Duplicate(String),

    #[error("unknown test type '{test_type}' (registered: {})", known.join(", "))]
    NotFound {
        test_type: String,
        known: Vec<String>,
    },
}

/// Run-level failure, mapped to the process exit status
#[derive(Error, Debug)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("setup of tests[{index}] '{name}' ({test_type}) failed: {source}")]
    Setup {
        index: usize,
        name: String,
        test_type: String,
        source: SetupError,
        cleanup: CleanupSummary,
    },

    #[error("attack failed: {source}")]
    Attack {
        source: AttackRunError,
        cleanup: CleanupSummary,
    },
}

/// Why the attack phase ended without a report
#[derive(Error, Debug)]
pub enum AttackRunError {
    #[error("cannot build the target sampler: {0}")]
    Sampler(#[from] SamplerError),

    #[error("cannot create the aggregator: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("outcome collector failed: {0}")]
    Collector(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => 2,
            RunError::Setup { .. } => 3,
            RunError::Attack { .. } => 4,
        }
    }

    /// Cleanup performed before the error was returned, if any
    pub fn cleanup(&self) -> Option<&CleanupSummary> {
        match self {
            RunError::Config(_) => None,
            RunError::Setup { cleanup, .. } | RunError::Attack { cleanup, .. } => Some(cleanup),
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;
