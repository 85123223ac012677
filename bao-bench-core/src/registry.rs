//! Test type registry
//!
//! Maps a test type name to a factory producing a fresh, unconfigured
//! benchmark. The registry is built once at startup and handed to the runner;
//! nothing registers itself globally.

use std::collections::BTreeMap;
use std::fmt;

use crate::benchmark::{BenchmarkTest, TestFactory};
use crate::error::RegistryError;

#[derive(Default)]
pub struct TestRegistry {
    factories: BTreeMap<String, TestFactory>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `test_type`
    pub fn register<F>(&mut self, test_type: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn BenchmarkTest> + Send + Sync + 'static,
    {
        let test_type = test_type.into();
        if self.factories.contains_key(&test_type) {
            return Err(RegistryError::Duplicate(test_type));
        }
        tracing::trace!(test_type = %test_type, "registering test type");
        self.factories.insert(test_type, Box::new(factory));
        Ok(())
    }

    pub fn lookup(&self, test_type: &str) -> Result<&TestFactory, RegistryError> {
        self.factories
            .get(test_type)
            .ok_or_else(|| RegistryError::NotFound {
                test_type: test_type.to_string(),
                known: self.test_types().iter().map(|t| t.to_string()).collect(),
            })
    }

    /// Build a fresh benchmark for `test_type`
    pub fn create(&self, test_type: &str) -> Result<Box<dyn BenchmarkTest>, RegistryError> {
        self.lookup(test_type).map(|factory| factory())
    }

    pub fn contains(&self, test_type: &str) -> bool {
        self.factories.contains_key(test_type)
    }

    /// Registered test types in sorted order
    pub fn test_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRegistry")
            .field("test_types", &self.test_types())
            .finish()
    }
}
