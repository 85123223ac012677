//! End-to-end runs against a mock secrets server
//!
//! Each test provisions real built-in benchmarks through the HTTP client,
//! attacks the mock for a short while and checks the report and the cleanup
//! calls the server received.

use anyhow::Result;
use bao_bench_config::{AttackConfig, TestDefinition};
use bao_bench_core::{BenchmarkRunner, RunError};
use bao_bench_http::{HttpClientConfig, VaultClient};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn attack(duration: Duration) -> AttackConfig {
    AttackConfig {
        duration,
        rate: 40.0,
        workers: 4,
        random_mounts: false,
        grace_period: Duration::from_secs(2),
    }
}

fn runner_for(server: &MockServer) -> Result<BenchmarkRunner> {
    let registry = Arc::new(bao_bench_targets::builtin_registry()?);
    let client = VaultClient::new(&server.uri(), Some("root"), None, &HttpClientConfig::default())?;
    Ok(BenchmarkRunner::new(registry, client).with_seed(7))
}

fn definition(test_type: &str, name: &str, weight: u32, config: &str) -> TestDefinition {
    TestDefinition::new(test_type, weight)
        .with_name(name)
        .with_config(serde_yaml::from_str(config).unwrap())
}

async fn mock_kv_mount(server: &MockServer, mount: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/v1/sys/mounts/{}", mount)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(format!(r"^/v1/{}/secret-\d+$", mount)))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(format!(r"^/v1/{}/secret-\d+$", mount)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"foo": 1}})),
        )
        .mount(server)
        .await;
}

fn deletes(requests: &[wiremock::Request]) -> Vec<String> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn test_weighted_run_reports_and_cleans_up() -> Result<()> {
    let server = MockServer::start().await;

    mock_kv_mount(&server, "reads").await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/reads"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/sys/policies/acl/policies/policy-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/policies/acl/policies"))
        .and(query_param("list", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": {"keys": ["policy-1"]}})),
        )
        .mount(&server)
        .await;
    // Already removed: counts as a clean removal
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/policies/acl/policies/policy-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let runner = runner_for(&server)?;
    let tests = vec![
        definition("kvv1_read", "reads", 3, "numkvs: 2"),
        definition("acl_policy_list", "policies", 1, "policies: 1"),
    ];
    let report = runner.run(&attack(Duration::from_millis(750)), &tests).await?;

    assert!(report.requests_sent > 0);
    assert_eq!(
        report.overall.requests + u64::from(report.abandoned),
        report.requests_sent
    );
    assert_eq!(report.overall.failures, 0, "errors: {:?}", report.overall.errors);

    let per_type_total: u64 = report.per_type.values().map(|s| s.requests).sum();
    assert_eq!(per_type_total, report.overall.requests);
    assert!(report.per_type.contains_key("kvv1_read"));
    assert!(report.per_type.contains_key("acl_policy_list"));

    assert_eq!(report.targets.len(), 2);
    assert_eq!(report.targets[0].path_prefix, "/v1/reads");
    assert!((report.targets[0].probability - 0.75).abs() < 1e-9);

    assert_eq!(report.cleanup.attempted, 2);
    assert_eq!(report.cleanup.succeeded, 2);
    assert!(report.cleanup.is_clean());

    // Cleanup runs newest first
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(
        deletes(&received),
        vec!["/v1/sys/policies/acl/policies/policy-1", "/v1/sys/mounts/reads"]
    );

    let json = report.render(bao_bench_config::ReportFormat::Json)?;
    let parsed: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(parsed["requests_sent"], report.requests_sent);
    Ok(())
}

#[tokio::test]
async fn test_setup_failure_cleans_up_provisioned_tests_only() -> Result<()> {
    let server = MockServer::start().await;

    mock_kv_mount(&server, "one").await;
    mock_kv_mount(&server, "two").await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/three"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"errors": ["path is already in use at three/"]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/v1/sys/mounts/(one|two)$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let runner = runner_for(&server)?;
    let tests = vec![
        definition("kvv1_read", "one", 1, "numkvs: 1"),
        definition("kvv1_write", "two", 1, "numkvs: 1"),
        definition("kvv1_read", "three", 1, "numkvs: 1"),
    ];
    let err = runner
        .run(&attack(Duration::from_secs(60)), &tests)
        .await
        .err()
        .expect("setup of the third test fails");

    assert_eq!(err.exit_code(), 3);
    let RunError::Setup {
        index, ref cleanup, ..
    } = err
    else {
        panic!("expected a setup error, got {}", err);
    };
    assert_eq!(index, 2);
    assert_eq!(cleanup.attempted, 2);
    assert_eq!(cleanup.succeeded, 2);
    assert!(err.to_string().contains("already in use"));

    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(deletes(&received), vec!["/v1/sys/mounts/two", "/v1/sys/mounts/one"]);
    // No attack traffic was sent
    assert!(!received
        .iter()
        .any(|r| r.method.as_str() == "GET" && r.url.path().contains("/secret-")));
    Ok(())
}

#[tokio::test]
async fn test_stop_request_ends_attack_and_still_cleans_up() -> Result<()> {
    let server = MockServer::start().await;

    mock_kv_mount(&server, "reads").await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/reads"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let runner = runner_for(&server)?;
    let shutdown = runner.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown.request_stop();
    });

    let report = runner
        .run(
            &attack(Duration::from_secs(3600)),
            &[definition("kvv1_read", "reads", 1, "numkvs: 1")],
        )
        .await?;

    assert!(report.stopped_early);
    assert!(report.attack_seconds < 60.0);
    assert_eq!(report.cleanup.attempted, 1);
    assert!(report.cleanup.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_failed_requests_are_classified() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/reads"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/reads/secret-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reads/secret-1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/reads"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let runner = runner_for(&server)?;
    let report = runner
        .run(
            &attack(Duration::from_millis(500)),
            &[definition("kvv1_read", "reads", 1, "numkvs: 1")],
        )
        .await?;

    let reads = &report.per_type["kvv1_read"];
    assert!(reads.requests > 0);
    assert_eq!(reads.successes, 0);
    assert_eq!(reads.errors["status_503"], reads.requests);
    assert_eq!(reads.status_codes["503"], reads.requests);
    Ok(())
}
