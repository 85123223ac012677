//! Built-in endpoint benchmarks
//!
//! Every benchmark here implements [`BenchmarkTest`] and is registered under
//! its test type by [`register_builtins`]:
//!
//! | test type | endpoint |
//! |---|---|
//! | `kvv1_read`, `kvv1_write`, `kvv1_list` | KV version 1 |
//! | `kvv2_read`, `kvv2_write`, `kvv2_list` | KV version 2 |
//! | `acl_policy_read`, `acl_policy_write`, `acl_policy_list` | `sys/policies/acl` |
//! | `mount` | `sys/mounts`, `sys/auth` |
//! | `namespace` | `sys/namespaces` |
//! | `redis_dynamic_secret` | database engine with the Redis plugin |

mod common;
pub mod kv;
pub mod mount;
pub mod namespace;
pub mod policy;
pub mod redis;

use bao_bench_core::{BenchmarkTest, RegistryError, TestRegistry};

pub use kv::{KvAction, KvConfig, KvTest, KvVersion};
pub use mount::{MountConfig, MountKind, MountTest};
pub use namespace::{NamespaceConfig, NamespaceTest};
pub use policy::{PolicyAction, PolicyConfig, PolicyTest};
pub use redis::{RedisConfig, RedisDynamicSecretTest, REDIS_PASSWORD_ENV, REDIS_USERNAME_ENV};

/// Add every built-in benchmark to `registry`
pub fn register_builtins(registry: &mut TestRegistry) -> Result<(), RegistryError> {
    for version in [KvVersion::V1, KvVersion::V2] {
        for action in [KvAction::Read, KvAction::Write, KvAction::List] {
            let test_type = KvTest::new(version, action).test_type().to_string();
            registry.register(test_type, move || {
                Box::new(KvTest::new(version, action)) as Box<dyn BenchmarkTest>
            })?;
        }
    }

    for action in [PolicyAction::Read, PolicyAction::Write, PolicyAction::List] {
        let test_type = PolicyTest::new(action).test_type().to_string();
        registry.register(test_type, move || {
            Box::new(PolicyTest::new(action)) as Box<dyn BenchmarkTest>
        })?;
    }

    registry.register("mount", || Box::new(MountTest::new()) as Box<dyn BenchmarkTest>)?;
    registry.register("namespace", || {
        Box::new(NamespaceTest::new()) as Box<dyn BenchmarkTest>
    })?;
    registry.register("redis_dynamic_secret", || {
        Box::new(RedisDynamicSecretTest::new()) as Box<dyn BenchmarkTest>
    })?;

    Ok(())
}

/// A registry holding exactly the built-in benchmarks
pub fn builtin_registry() -> Result<TestRegistry, RegistryError> {
    let mut registry = TestRegistry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}
