//! End-to-end `get_data` runs against the inventory and stored plugin fixtures

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use costroll::config::Settings;
use costroll::connectors::{Connectors, DirectoryPluginConnector, InventoryConnector};
use costroll::services::{BillingService, ResponseCacheService};
use costroll::types::{
    CostrollError, FailureKind, GetDataRequest, GetDataResponse, Granularity, QueryWindow, Scope,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn service_with(plugin_root: PathBuf, settings: &Settings) -> BillingService {
    let inventory = InventoryConnector::load(&fixtures().join("inventory.json")).unwrap();
    let connectors = Connectors::with_inventory(
        Arc::new(inventory),
        Arc::new(DirectoryPluginConnector::new(plugin_root)),
    );
    BillingService::new(connectors, settings)
}

fn service() -> BillingService {
    service_with(fixtures().join("plugins"), &Settings::default())
}

fn request(scope: Scope, aggregation: &[&str]) -> GetDataRequest {
    GetDataRequest {
        scope,
        window: QueryWindow::parse("2020-10-01", "2020-12-31", Granularity::Monthly).unwrap(),
        aggregation: aggregation.iter().map(|s| s.to_string()).collect(),
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// (resource_type, date, cost) triples in output order
fn flatten(response: &GetDataResponse) -> Vec<(String, String, Decimal)> {
    response
        .results
        .iter()
        .flat_map(|r| {
            r.billing_data
                .iter()
                .map(move |b| (r.resource_type.clone(), b.date.clone(), b.cost))
        })
        .collect()
}

fn row(resource_type: &str, date: &str, cost: &str) -> (String, String, Decimal) {
    (resource_type.to_string(), date.to_string(), dec(cost))
}

#[tokio::test]
async fn test_domain_without_selector_collapses_to_base_type() {
    let response = service()
        .get_data(&request(Scope::domain("domain-1"), &[]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.total_count, 1);
    assert_eq!(
        flatten(&response),
        vec![
            row("inv.CloudService", "2020-10", "168"),
            row("inv.CloudService", "2020-11", "98.5"),
            row("inv.CloudService", "2020-12", "0.5"),
        ]
    );
    assert!(response.results[0]
        .billing_data
        .iter()
        .all(|b| b.currency == "USD"));

    // one key from sa-web-dev has a dangling dimension
    let diagnostics = &response.diagnostics;
    assert_eq!(diagnostics.bindings_resolved, 3);
    assert_eq!(diagnostics.bindings_failed, 0);
    assert_eq!(diagnostics.malformed_keys.len(), 1);
    assert_eq!(
        diagnostics.malformed_keys[0].key,
        "inv.CloudService?provider=aws&region_code"
    );
}

#[tokio::test]
async fn test_domain_by_region() {
    let response = service()
        .get_data(
            &request(Scope::domain("domain-1"), &["REGION"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.total_count, 3);
    assert_eq!(
        flatten(&response),
        vec![
            row("inv.CloudService?region_code=ap-ne-2", "2020-10", "125"),
            row("inv.CloudService?region_code=ap-ne-2", "2020-11", "98.5"),
            row("inv.CloudService?region_code=asia-ne3", "2020-10", "33"),
            row("inv.CloudService?region_code=asia-ne3", "2020-12", "0.5"),
            row("inv.CloudService?region_code=us-e-2", "2020-10", "10"),
        ]
    );
}

#[tokio::test]
async fn test_project_group_includes_nested_groups() {
    let scope = Scope {
        domain_id: "domain-1".into(),
        project_group_id: Some("pg-platform".into()),
        ..Default::default()
    };
    let response = service()
        .get_data(&request(scope, &["RESOURCE_TYPE"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.diagnostics.bindings_resolved, 2);
    assert_eq!(
        flatten(&response),
        vec![
            row("inv.CloudService?service_code=AmazonEC2", "2020-10", "125"),
            row("inv.CloudService?service_code=AmazonEC2", "2020-11", "98.5"),
            row("inv.CloudService?service_code=AmazonS3", "2020-10", "10"),
        ]
    );
}

#[tokio::test]
async fn test_explicit_service_account() {
    let scope = Scope {
        domain_id: "domain-1".into(),
        service_accounts: vec!["sa-warehouse".into()],
        ..Default::default()
    };
    let response = service()
        .get_data(&request(scope, &[]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.diagnostics.bindings_resolved, 1);
    assert!(response.diagnostics.is_clean());
    assert_eq!(
        flatten(&response),
        vec![
            row("inv.CloudService", "2020-10", "33"),
            row("inv.CloudService", "2020-12", "0.5"),
        ]
    );
}

#[tokio::test]
async fn test_missing_plugin_data_is_partial_failure() {
    let temp = TempDir::new().unwrap();
    let aws = temp.path().join("plugin-aws");
    fs::create_dir_all(&aws).unwrap();
    for name in ["secret-web.json", "secret-web-dev.json"] {
        fs::copy(fixtures().join("plugins").join("plugin-aws").join(name), aws.join(name)).unwrap();
    }

    let response = service_with(temp.path().to_path_buf(), &Settings::default())
        .get_data(&request(Scope::domain("domain-1"), &[]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        flatten(&response),
        vec![
            row("inv.CloudService", "2020-10", "135"),
            row("inv.CloudService", "2020-11", "98.5"),
        ]
    );
    let diagnostics = &response.diagnostics;
    assert_eq!(diagnostics.bindings_failed, 1);
    assert_eq!(diagnostics.failures.len(), 1);
    assert_eq!(diagnostics.failures[0].data_source_id, "ds-gcp");
    assert_eq!(diagnostics.failures[0].kind, FailureKind::Plugin);
}

#[tokio::test]
async fn test_no_plugin_data_at_all_fails_request() {
    let temp = TempDir::new().unwrap();
    let err = service_with(temp.path().to_path_buf(), &Settings::default())
        .get_data(&request(Scope::domain("domain-1"), &[]), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CostrollError::AllBindingsFailed { bindings, failures } => {
            assert_eq!(bindings, 3);
            assert_eq!(failures.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_shared_cache_dir_keeps_plugin_roots_apart() {
    let edited = TempDir::new().unwrap();
    let aws = edited.path().join("plugin-aws");
    fs::create_dir_all(&aws).unwrap();
    let original =
        fs::read_to_string(fixtures().join("plugins").join("plugin-aws").join("secret-web.json"))
            .unwrap();
    fs::write(aws.join("secret-web.json"), original.replace("120.25", "999")).unwrap();

    let cache_dir = TempDir::new().unwrap();
    let cached = |root: PathBuf| {
        let cache = ResponseCacheService::with_cache_dir(cache_dir.path().to_path_buf(), 3600)
            .with_namespace(format!("plugins=dir:{}", root.display()));
        service_with(root, &Settings::default()).with_cache(cache)
    };
    let req = request(
        Scope {
            project_id: Some("project-web".into()),
            ..Scope::domain("domain-1")
        },
        &[],
    );

    let stored = cached(fixtures().join("plugins"))
        .get_data(&req, &CancellationToken::new())
        .await
        .unwrap();
    let replayed = cached(edited.path().to_path_buf())
        .get_data(&req, &CancellationToken::new())
        .await
        .unwrap();

    assert!(stored.diagnostics.is_clean());
    assert_eq!(
        flatten(&stored),
        vec![
            row("inv.CloudService", "2020-10", "130.25"),
            row("inv.CloudService", "2020-11", "98.5"),
        ]
    );
    assert_eq!(
        flatten(&replayed),
        vec![
            row("inv.CloudService", "2020-10", "1009"),
            row("inv.CloudService", "2020-11", "98.5"),
        ]
    );

    // each root still hits its own entry
    let again = cached(fixtures().join("plugins"))
        .get_data(&req, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again, stored);
}

#[tokio::test]
async fn test_output_independent_of_concurrency() {
    let serial = Settings {
        max_in_flight: 1,
        ..Default::default()
    };
    let wide = Settings {
        max_in_flight: 16,
        ..Default::default()
    };
    let req = request(Scope::domain("domain-1"), &["REGION", "RESOURCE_TYPE"]);

    let a = service_with(fixtures().join("plugins"), &serial)
        .get_data(&req, &CancellationToken::new())
        .await
        .unwrap();
    let b = service_with(fixtures().join("plugins"), &wide)
        .get_data(&req, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test]
async fn test_selector_order_changes_key_order() {
    let req_a = request(Scope::domain("domain-1"), &["REGION", "RESOURCE_TYPE"]);
    let req_b = request(Scope::domain("domain-1"), &["RESOURCE_TYPE", "REGION"]);

    let a = service().get_data(&req_a, &CancellationToken::new()).await.unwrap();
    let b = service().get_data(&req_b, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        a.results[0].resource_type,
        "inv.CloudService?region_code=ap-ne-2&service_code=AmazonEC2"
    );
    assert_eq!(
        b.results[0].resource_type,
        "inv.CloudService?service_code=AmazonEC2&region_code=ap-ne-2"
    );
    assert_eq!(a.total_count, b.total_count);
}
