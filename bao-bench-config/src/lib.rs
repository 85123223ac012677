//! Domain-driven configuration management for bao-bench
//!
//! A benchmark run is described by a single YAML document split into
//! functional domains (server, attack, http, logging, report) plus the
//! ordered list of weighted test definitions. Every domain carries defaults,
//! validation, and environment variable overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    attack::AttackConfig,
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    report::{ReportConfig, ReportFormat},
    server::ServerConfig,
    tests::TestDefinition,
    BenchConfig,
};
