//! Weighted test definitions
//!
//! Each entry names a registered test type, its relative weight, and an opaque
//! configuration block that only the matching endpoint implementation knows
//! how to decode.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One configured, weighted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Registered test type, e.g. `kvv2_read`
    #[serde(rename = "type")]
    pub test_type: String,

    /// Human-provided resource name. Defaults to the test type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Relative sampling weight, not a percentage
    pub weight: u32,

    /// Endpoint-specific configuration, decoded by the test implementation
    #[serde(default = "empty_mapping", skip_serializing_if = "is_empty_block")]
    pub config: serde_yaml::Value,
}

impl TestDefinition {
    pub fn new(test_type: impl Into<String>, weight: u32) -> Self {
        Self {
            test_type: test_type.into(),
            name: None,
            weight,
            config: empty_mapping(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_config(mut self, config: serde_yaml::Value) -> Self {
        self.config = config;
        self
    }

    /// Name used as the resource path prefix during setup
    pub fn resolved_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.test_type)
    }
}

/// Reject definition sets that could never produce a valid attack.
///
/// Checked before any provisioning: the set must be non-empty, every weight
/// positive, and every type named. Without randomized resource paths two
/// definitions with the same name would provision over each other.
pub fn validate_definitions(definitions: &[TestDefinition], random_mounts: bool) -> ConfigResult<()> {
    if definitions.is_empty() {
        return Err(tests_error("at least one test definition is required"));
    }

    let mut total: u64 = 0;
    for (index, definition) in definitions.iter().enumerate() {
        if definition.test_type.trim().is_empty() {
            return Err(tests_error(format!("tests[{}]: type cannot be empty", index)));
        }
        if definition.weight == 0 {
            return Err(tests_error(format!(
                "tests[{}] ({}): weight must be greater than 0",
                index, definition.test_type
            )));
        }
        if let Some(ref name) = definition.name {
            if name.trim().is_empty() {
                return Err(tests_error(format!("tests[{}]: name cannot be blank", index)));
            }
        }
        if !(definition.config.is_mapping() || definition.config.is_null()) {
            return Err(tests_error(format!(
                "tests[{}] ({}): config must be a mapping",
                index, definition.test_type
            )));
        }
        total += u64::from(definition.weight);
    }

    if total > u64::from(u32::MAX) {
        return Err(tests_error(format!("sum of weights {} overflows u32", total)));
    }

    if !random_mounts {
        let mut seen = HashSet::new();
        for definition in definitions {
            if !seen.insert(definition.resolved_name()) {
                return Err(tests_error(format!(
                    "duplicate test name '{}' (set a distinct name or enable random_mounts)",
                    definition.resolved_name()
                )));
            }
        }
    }

    Ok(())
}

/// Definitions written by `config generate`
pub fn sample_definitions() -> Vec<TestDefinition> {
    let mut kv_config = serde_yaml::Mapping::new();
    kv_config.insert("numkvs".into(), 100.into());
    kv_config.insert("kvsize".into(), 10.into());

    vec![
        TestDefinition::new("kvv2_read", 3)
            .with_name("kvv2-read")
            .with_config(serde_yaml::Value::Mapping(kv_config.clone())),
        TestDefinition::new("kvv2_write", 1)
            .with_name("kvv2-write")
            .with_config(serde_yaml::Value::Mapping(kv_config)),
        TestDefinition::new("acl_policy_read", 1).with_name("policy-read"),
    ]
}

fn tests_error(message: impl Into<String>) -> ConfigError {
    ConfigError::Domain {
        domain: "tests".to_string(),
        message: message.into(),
    }
}

fn empty_mapping() -> serde_yaml::Value {
    serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
}

fn is_empty_block(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Null => true,
        serde_yaml::Value::Mapping(m) => m.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definitions() {
        let yaml = r#"
- type: kvv2_read
  name: kv-read
  weight: 3
  config:
    numkvs: 50
- type: acl_policy_list
  weight: 1
"#;
        let definitions: Vec<TestDefinition> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].resolved_name(), "kv-read");
        assert_eq!(definitions[0].config["numkvs"].as_u64(), Some(50));
        assert_eq!(definitions[1].resolved_name(), "acl_policy_list");
        assert!(definitions[1].config.is_mapping());
        assert!(validate_definitions(&definitions, false).is_ok());
    }

    #[test]
    fn test_empty_set_rejected() {
        let err = validate_definitions(&[], true).unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let definitions = vec![
            TestDefinition::new("kvv1_read", 1),
            TestDefinition::new("kvv1_write", 0),
        ];
        let err = validate_definitions(&definitions, true).unwrap_err();
        assert!(err.to_string().contains("tests[1]"));
    }

    #[test]
    fn test_missing_weight_fails_to_parse() {
        let result: Result<Vec<TestDefinition>, _> = serde_yaml::from_str("- type: kvv1_read\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_weight_fails_to_parse() {
        let result: Result<Vec<TestDefinition>, _> =
            serde_yaml::from_str("- type: kvv1_read\n  weight: -2\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_names_only_rejected_without_random_mounts() {
        let definitions = vec![
            TestDefinition::new("kvv1_read", 1),
            TestDefinition::new("kvv1_read", 2),
        ];
        assert!(validate_definitions(&definitions, true).is_ok());
        assert!(validate_definitions(&definitions, false).is_err());
    }

    #[test]
    fn test_scalar_config_rejected() {
        let definitions =
            vec![TestDefinition::new("kvv1_read", 1).with_config(serde_yaml::Value::from(5))];
        assert!(validate_definitions(&definitions, true).is_err());
    }

    #[test]
    fn test_sample_definitions_are_valid() {
        assert!(validate_definitions(&sample_definitions(), false).is_ok());
    }
}
