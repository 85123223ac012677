//! Lifecycle controller
//!
//! Drives each test definition through configure, provision and cleanup.
//! Configuration of every definition happens before any server resource is
//! created. Provisioning is sequential and stops at the first failure, after
//! which everything already provisioned is torn down again. Every instance
//! that finished setup is cleaned up exactly once.

use bao_bench_config::{AttackConfig, TestDefinition};
use bao_bench_http::VaultClient;
use bao_bench_resilience::ShutdownCoordinator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::benchmark::{BenchmarkTest, BoundBenchmark, TargetInfo};
use crate::error::{ConfigError, RegistryError, SetupError};
use crate::registry::TestRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unparsed,
    Configured,
    Provisioned,
    Attacking,
    CleanedUp,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unparsed => "unparsed",
            LifecycleState::Configured => "configured",
            LifecycleState::Provisioned => "provisioned",
            LifecycleState::Attacking => "attacking",
            LifecycleState::CleanedUp => "cleaned_up",
            LifecycleState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// What happened to one definition during the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub index: usize,
    pub name: String,
    pub test_type: String,
    pub weight: u32,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleLedger {
    records: Vec<DefinitionRecord>,
}

impl LifecycleLedger {
    pub fn records(&self) -> &[DefinitionRecord] {
        &self.records
    }

    pub fn state(&self, index: usize) -> Option<LifecycleState> {
        self.records.get(index).map(|r| r.state)
    }

    fn transition(&mut self, index: usize, state: LifecycleState) {
        if let Some(record) = self.records.get_mut(index) {
            debug!(
                index,
                test_type = %record.test_type,
                from = %record.state,
                to = %state,
                "lifecycle transition"
            );
            record.state = state;
        }
    }

    fn fail(&mut self, index: usize, error: impl Into<String>) {
        if let Some(record) = self.records.get_mut(index) {
            record.error = Some(error.into());
        }
        self.transition(index, LifecycleState::Failed);
    }
}

/// A definition whose configuration block parsed successfully
pub struct ConfiguredTest {
    pub index: usize,
    pub name: String,
    pub test_type: String,
    pub weight: u32,
    pub test: Box<dyn BenchmarkTest>,
}

impl fmt::Debug for ConfiguredTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredTest")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("test_type", &self.test_type)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// A provisioned definition: what the sampler picks from
#[derive(Clone)]
pub struct BenchmarkInstance {
    pub index: usize,
    pub name: String,
    pub test_type: Arc<str>,
    pub weight: u32,
    pub bound: Arc<dyn BoundBenchmark>,
}

impl fmt::Debug for BenchmarkInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkInstance")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("test_type", &self.test_type)
            .field("weight", &self.weight)
            .field("target", &self.bound.describe())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub index: usize,
    pub name: String,
    pub test_type: String,
    pub error: String,
}

/// Outcome of a cleanup pass. Failures are warnings, never fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// Resources that were already gone; counted as succeeded too
    pub already_absent: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| {
                format!(
                    "cleanup of tests[{}] '{}' ({}) failed: {}",
                    f.index, f.name, f.test_type, f.error
                )
            })
            .collect()
    }
}

/// Setup stopped at `index`; the earlier instances have been cleaned up
#[derive(Debug)]
pub struct SetupFailure {
    pub index: usize,
    pub name: String,
    pub test_type: String,
    pub error: SetupError,
    pub cleanup: CleanupSummary,
}

/// Look up and configure every definition without touching the server
pub fn configure_all(
    registry: &TestRegistry,
    definitions: &[TestDefinition],
) -> Result<Vec<ConfiguredTest>, ConfigError> {
    if definitions.is_empty() {
        return Err(ConfigError::Empty);
    }

    // Weights and types are checked for the whole set before any parsing
    for (index, definition) in definitions.iter().enumerate() {
        if definition.weight == 0 {
            return Err(ConfigError::ZeroWeight {
                index,
                test_type: definition.test_type.clone(),
            });
        }
        if let Err(RegistryError::NotFound { test_type, known }) =
            registry.lookup(&definition.test_type)
        {
            return Err(ConfigError::UnknownTestType {
                index,
                test_type,
                known,
            });
        }
    }

    let mut configured = Vec::with_capacity(definitions.len());
    for (index, definition) in definitions.iter().enumerate() {
        let name = definition.resolved_name().to_string();
        let mut test = registry
            .create(&definition.test_type)
            .map_err(|_| ConfigError::UnknownTestType {
                index,
                test_type: definition.test_type.clone(),
                known: Vec::new(),
            })?;

        test.parse_config(&definition.config)
            .map_err(|source| ConfigError::Definition {
                index,
                name: name.clone(),
                test_type: definition.test_type.clone(),
                source: Box::new(source),
            })?;

        debug!(index, name = %name, test_type = %definition.test_type, "definition configured");
        configured.push(ConfiguredTest {
            index,
            name,
            test_type: definition.test_type.clone(),
            weight: definition.weight,
            test,
        });
    }

    Ok(configured)
}

pub struct LifecycleController<'a> {
    registry: &'a TestRegistry,
    client: &'a VaultClient,
    top: &'a AttackConfig,
    shutdown: Option<Arc<ShutdownCoordinator>>,
    ledger: LifecycleLedger,
    provisioned: Vec<BenchmarkInstance>,
}

impl<'a> LifecycleController<'a> {
    pub fn new(registry: &'a TestRegistry, client: &'a VaultClient, top: &'a AttackConfig) -> Self {
        Self {
            registry,
            client,
            top,
            shutdown: None,
            ledger: LifecycleLedger::default(),
            provisioned: Vec::new(),
        }
    }

    /// Abort provisioning early once a stop has been requested
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn ledger(&self) -> &LifecycleLedger {
        &self.ledger
    }

    /// Instances that completed setup and have not been cleaned up yet
    pub fn instances(&self) -> &[BenchmarkInstance] {
        &self.provisioned
    }

    pub fn configure(
        &mut self,
        definitions: &[TestDefinition],
    ) -> Result<Vec<ConfiguredTest>, ConfigError> {
        self.ledger.records = definitions
            .iter()
            .enumerate()
            .map(|(index, d)| DefinitionRecord {
                index,
                name: d.resolved_name().to_string(),
                test_type: d.test_type.clone(),
                weight: d.weight,
                state: LifecycleState::Unparsed,
                target: None,
                error: None,
            })
            .collect();

        match configure_all(self.registry, definitions) {
            Ok(configured) => {
                for test in &configured {
                    self.ledger.transition(test.index, LifecycleState::Configured);
                }
                info!(definitions = configured.len(), "all test definitions configured");
                Ok(configured)
            }
            Err(error) => {
                let failed_index = match &error {
                    ConfigError::ZeroWeight { index, .. }
                    | ConfigError::UnknownTestType { index, .. }
                    | ConfigError::Definition { index, .. } => Some(*index),
                    _ => None,
                };
                if let Some(index) = failed_index {
                    self.ledger.fail(index, error.to_string());
                }
                Err(error)
            }
        }
    }

    /// Run setup for each configured test in order.
    ///
    /// On the first failure, every instance provisioned so far is cleaned up
    /// in reverse order and the failure is returned with that cleanup's
    /// summary. The failing definition and those after it are never cleaned
    /// up here.
    pub async fn provision(&mut self, configured: Vec<ConfiguredTest>) -> Result<(), SetupFailure> {
        for test in configured {
            let result = if self.stop_requested() {
                Err(SetupError::Cancelled)
            } else {
                info!(
                    index = test.index,
                    name = %test.name,
                    test_type = %test.test_type,
                    "setting up test"
                );
                test.test.setup(self.client, &test.name, self.top).await
            };

            match result {
                Ok(bound) => {
                    let target = bound.describe();
                    debug!(index = test.index, target = %target, "test provisioned");
                    if let Some(record) = self.ledger.records.get_mut(test.index) {
                        record.target = Some(target);
                    }
                    self.ledger.transition(test.index, LifecycleState::Provisioned);
                    self.provisioned.push(BenchmarkInstance {
                        index: test.index,
                        name: test.name,
                        test_type: Arc::from(test.test_type.as_str()),
                        weight: test.weight,
                        bound,
                    });
                }
                Err(error) => {
                    warn!(
                        index = test.index,
                        name = %test.name,
                        test_type = %test.test_type,
                        %error,
                        provisioned = self.provisioned.len(),
                        "setup failed, cleaning up provisioned tests"
                    );
                    self.ledger.fail(test.index, error.to_string());
                    let cleanup = self.cleanup().await;
                    return Err(SetupFailure {
                        index: test.index,
                        name: test.name,
                        test_type: test.test_type,
                        error,
                        cleanup,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn mark_attacking(&mut self) {
        let indices: Vec<usize> = self.provisioned.iter().map(|i| i.index).collect();
        for index in indices {
            self.ledger.transition(index, LifecycleState::Attacking);
        }
    }

    /// Best-effort cleanup of every provisioned instance, newest first.
    ///
    /// Instances are removed from the controller as they are visited, so a
    /// second call does nothing.
    pub async fn cleanup(&mut self) -> CleanupSummary {
        let mut summary = CleanupSummary::default();

        while let Some(instance) = self.provisioned.pop() {
            summary.attempted += 1;
            debug!(
                index = instance.index,
                name = %instance.name,
                test_type = %instance.test_type,
                "cleaning up test"
            );

            match instance.bound.cleanup(self.client).await {
                Ok(()) => {
                    summary.succeeded += 1;
                    self.ledger.transition(instance.index, LifecycleState::CleanedUp);
                }
                Err(error) if error.is_not_found() => {
                    debug!(index = instance.index, %error, "nothing left to clean up");
                    summary.succeeded += 1;
                    summary.already_absent += 1;
                    self.ledger.transition(instance.index, LifecycleState::CleanedUp);
                }
                Err(error) => {
                    warn!(
                        index = instance.index,
                        name = %instance.name,
                        test_type = %instance.test_type,
                        %error,
                        "cleanup failed"
                    );
                    self.ledger.fail(instance.index, error.to_string());
                    summary.failures.push(CleanupFailure {
                        index: instance.index,
                        name: instance.name.clone(),
                        test_type: instance.test_type.to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }

        if summary.attempted > 0 {
            info!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failures.len(),
                "cleanup finished"
            );
        }
        summary
    }

    fn stop_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_stop_requested())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_configure_rejects_empty_set() {
        let registry = scripted_registry(Arc::default());
        assert!(matches!(configure_all(&registry, &[]), Err(ConfigError::Empty)));
    }

    #[test]
    fn test_configure_rejects_zero_weight_before_parsing() {
        let registry = scripted_registry(Arc::default());
        let definitions = vec![definition("fail_config", "a", 1), definition("ok", "b", 0)];

        // The zero weight is reported even though an earlier definition
        // would fail to parse
        let err = configure_all(&registry, &definitions).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWeight { index: 1, .. }));
    }

    #[test]
    fn test_configure_rejects_unknown_type() {
        let registry = scripted_registry(Arc::default());
        let definitions = vec![definition("ok", "a", 1), definition("kvv9_read", "b", 1)];

        match configure_all(&registry, &definitions) {
            Err(ConfigError::UnknownTestType { index, test_type, known }) => {
                assert_eq!(index, 1);
                assert_eq!(test_type, "kvv9_read");
                assert!(known.contains(&"ok".to_string()));
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.len())),
        }
    }

    #[tokio::test]
    async fn test_config_failure_happens_before_any_setup() {
        let calls = Arc::new(Calls::default());
        let registry = scripted_registry(calls.clone());
        let client = offline_client();
        let top = AttackConfig::default();
        let mut controller = LifecycleController::new(&registry, &client, &top);

        let definitions = vec![
            definition("ok", "a", 1),
            definition("ok", "b", 1),
            definition("fail_config", "c", 1),
        ];
        let err = controller.configure(&definitions).unwrap_err();

        assert!(matches!(err, ConfigError::Definition { index: 2, .. }));
        assert_eq!(calls.setups.load(Ordering::SeqCst), 0);
        assert_eq!(controller.ledger().state(2), Some(LifecycleState::Failed));
        assert_eq!(controller.ledger().state(0), Some(LifecycleState::Unparsed));
    }

    #[tokio::test]
    async fn test_setup_failure_cleans_up_earlier_instances_once() {
        let calls = Arc::new(Calls::default());
        let registry = scripted_registry(calls.clone());
        let client = offline_client();
        let top = AttackConfig::default();
        let mut controller = LifecycleController::new(&registry, &client, &top);

        let definitions = vec![
            definition("ok", "first", 1),
            definition("ok", "second", 1),
            definition("fail_setup", "third", 1),
            definition("ok", "fourth", 1),
        ];
        let configured = controller.configure(&definitions).unwrap();
        let failure = controller.provision(configured).await.unwrap_err();

        assert_eq!(failure.index, 2);
        assert_eq!(failure.name, "third");
        assert_eq!(failure.cleanup.attempted, 2);
        assert_eq!(failure.cleanup.succeeded, 2);
        // Reverse order, failing and later definitions untouched
        assert_eq!(calls.cleaned(), vec!["second", "first"]);
        assert_eq!(calls.setups.load(Ordering::SeqCst), 3);

        let ledger = controller.ledger();
        assert_eq!(ledger.state(0), Some(LifecycleState::CleanedUp));
        assert_eq!(ledger.state(1), Some(LifecycleState::CleanedUp));
        assert_eq!(ledger.state(2), Some(LifecycleState::Failed));
        assert_eq!(ledger.state(3), Some(LifecycleState::Configured));

        // Nothing left to clean
        let again = controller.cleanup().await;
        assert_eq!(again.attempted, 0);
        assert_eq!(calls.cleaned().len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_collects_failures_and_continues() {
        let calls = Arc::new(Calls::default());
        let registry = scripted_registry(calls.clone());
        let client = offline_client();
        let top = AttackConfig::default();
        let mut controller = LifecycleController::new(&registry, &client, &top);

        let definitions = vec![
            definition("ok", "a", 1),
            definition("stuck", "b", 1),
            definition("gone", "c", 1),
        ];
        let configured = controller.configure(&definitions).unwrap();
        controller.provision(configured).await.unwrap();
        assert_eq!(controller.instances().len(), 3);
        controller.mark_attacking();
        assert_eq!(controller.ledger().state(1), Some(LifecycleState::Attacking));

        let summary = controller.cleanup().await;
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.already_absent, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].name, "b");
        assert!(summary.warnings()[0].contains("permission denied"));
        assert_eq!(calls.cleaned(), vec!["c", "b", "a"]);

        assert_eq!(controller.ledger().state(1), Some(LifecycleState::Failed));
        assert_eq!(controller.ledger().state(2), Some(LifecycleState::CleanedUp));
    }

    #[tokio::test]
    async fn test_stop_request_cancels_remaining_setup() {
        let calls = Arc::new(Calls::default());
        let registry = scripted_registry(calls.clone());
        let client = offline_client();
        let top = AttackConfig::default();
        let shutdown = Arc::new(ShutdownCoordinator::new());
        shutdown.request_stop();
        let mut controller =
            LifecycleController::new(&registry, &client, &top).with_shutdown(shutdown);

        let configured = controller
            .configure(&[definition("ok", "a", 1)])
            .unwrap();
        let failure = controller.provision(configured).await.unwrap_err();

        assert!(matches!(failure.error, SetupError::Cancelled));
        assert_eq!(calls.setups.load(Ordering::SeqCst), 0);
    }
}
