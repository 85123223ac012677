//! Weighted multi-target benchmark orchestration
//!
//! A run takes a list of test definitions, each naming a registered test type
//! with a weight and a type-specific configuration block, and:
//!
//! 1. configures every definition (no server calls),
//! 2. provisions them one at a time against the server,
//! 3. attacks at a fixed rate, choosing each request's target with
//!    probability proportional to its weight,
//! 4. cleans up everything it provisioned, and
//! 5. reports latency and throughput per test type and in total.
//!
//! Endpoint-specific behaviour lives behind [`BenchmarkTest`] and
//! [`BoundBenchmark`]; this crate never builds a request itself.

pub mod aggregator;
pub mod attack;
pub mod benchmark;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod registry;
pub mod report;
pub mod runner;
pub mod sampler;

pub use aggregator::{Aggregator, AggregatorError, LatencySummary, RequestOutcome, TypeSummary};
pub use attack::{AttackDriver, AttackSummary, DriverError};
pub use benchmark::{decode_config, BenchmarkTest, BoundBenchmark, TargetInfo, TestFactory};
pub use error::{
    AttackError, AttackRunError, CleanupError, ConfigError, RegistryError, RunError, RunResult,
    SamplerError, SetupError,
};
pub use executor::{ReqwestExecutor, RequestExecutor, ResponseSummary};
pub use lifecycle::{
    configure_all, BenchmarkInstance, CleanupSummary, LifecycleController, LifecycleLedger,
    LifecycleState,
};
pub use registry::TestRegistry;
pub use report::{Report, ReportError, RunMetadata, TargetEntry};
pub use runner::BenchmarkRunner;
pub use sampler::WeightedSampler;
