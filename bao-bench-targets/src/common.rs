//! Helpers shared by the built-in benchmarks

use bao_bench_config::AttackConfig;
use bao_bench_core::{CleanupError, SetupError};
use bao_bench_http::VaultClient;
use rand::{Rng, RngCore};
use tracing::{debug, warn};
use uuid::Uuid;

/// The name to create server resources under: `name` itself, or a fresh UUID
/// when random mounts are enabled
pub(crate) fn resource_name(name: &str, top: &AttackConfig) -> String {
    if top.random_mounts {
        Uuid::new_v4().to_string()
    } else {
        name.to_string()
    }
}

/// UUID drawn from the worker's RNG
pub(crate) fn random_uuid(rng: &mut dyn RngCore) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Uniform pick in `1..=count`
pub(crate) fn pick(rng: &mut dyn RngCore, count: u32) -> u32 {
    rng.random_range(1..=count.max(1))
}

/// `{"data": {"foo": "aaa…"}}` with `size` bytes of payload
pub(crate) fn kv_payload(size: usize) -> String {
    serde_json::json!({ "data": { "foo": "a".repeat(size) } }).to_string()
}

/// Mount a secrets engine, mapping failure to a setup step
pub(crate) async fn mount_engine(
    client: &VaultClient,
    mount: &str,
    engine: &str,
    options: Option<std::collections::BTreeMap<String, String>>,
) -> Result<(), SetupError> {
    client
        .mount(mount, engine, options)
        .await
        .map_err(|e| SetupError::api(format!("mounting {} secrets engine at {}", engine, mount), e))
}

pub(crate) async fn unmount_engine(client: &VaultClient, mount: &str) -> Result<(), CleanupError> {
    client
        .unmount(mount)
        .await
        .map_err(|e| CleanupError::from_http(format!("mount {}", mount), e))
}

/// Undo a mount after a later setup step failed. Errors are logged only; the
/// setup error is what gets reported.
pub(crate) async fn rollback_mount(client: &VaultClient, mount: &str) {
    debug!(mount = %mount, "rolling back partially configured mount");
    if let Err(error) = client.unmount(mount).await {
        warn!(mount = %mount, %error, "failed to roll back mount");
    }
}

/// Fold per-resource cleanup results into one: every resource already gone
/// is `NotFound`, any real failure is reported with the rest.
pub(crate) fn combine_cleanup(
    scope: &str,
    attempted: usize,
    results: Vec<Result<(), CleanupError>>,
) -> Result<(), CleanupError> {
    let mut not_found = 0;
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => not_found += 1,
            Err(e) => failures.push(e.to_string()),
        }
    }

    if !failures.is_empty() {
        return Err(CleanupError::Failed(format!(
            "{} of {} resources under {} could not be removed: {}",
            failures.len(),
            attempted,
            scope,
            failures.join("; ")
        )));
    }
    if attempted > 0 && not_found == attempted {
        return Err(CleanupError::NotFound {
            resource: scope.to_string(),
        });
    }
    Ok(())
}
