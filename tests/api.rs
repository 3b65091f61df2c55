mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use common::{Health, MemoryRepo};
use serde_json::{json, Value};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tenantforge::certs::DisabledCertificates;
use tenantforge::metrics::ProvisioningMetrics;
use tenantforge::queue::ProvisioningQueue;
use tenantforge::routes::app;
use tenantforge::state::AppState;
use tenantforge::tenant::TenantRecord;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

const KEY: &str = "test-key";

struct TestApp {
    router: Router,
    repo: Arc<MemoryRepo>,
    queue: Arc<ProvisioningQueue>,
}

fn test_app(healthy: bool) -> TestApp {
    let repo = Arc::new(MemoryRepo::default());
    let queue = Arc::new(ProvisioningQueue::new());
    let state = AppState::new(
        KEY.into(),
        queue.clone(),
        repo.clone(),
        Arc::new(Health {
            healthy,
            calls: AtomicU32::new(0),
        }),
        Arc::new(DisabledCertificates),
        Arc::new(ProvisioningMetrics::new()),
    );
    TestApp {
        router: app(state),
        repo,
        queue,
    }
}

fn record(domain: &str, state: &str, port: Option<u16>) -> TenantRecord {
    TenantRecord {
        id: Uuid::new_v4(),
        domain: domain.into(),
        state: state.into(),
        port,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn provision_request(key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post("/api/provision").header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(resp: Response) -> Value {
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn provision_requires_api_key() {
    let t = test_app(true);
    let body = json!({ "domain": "shop.example.com" });

    let resp = t
        .router
        .clone()
        .oneshot(provision_request(None, body.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = t
        .router
        .oneshot(provision_request(Some("wrong"), body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(t.queue.is_empty());
}

#[tokio::test]
async fn provision_enqueues_and_returns_queued() {
    let t = test_app(true);
    let resp = t
        .router
        .oneshot(provision_request(
            Some(KEY),
            json!({ "domain": "  Shop.Example.COM ", "appType": "Node" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "Queued");
    assert_eq!(json["domain"], "shop.example.com");

    let queued = t.queue.dequeue(&CancellationToken::new()).await.unwrap();
    assert_eq!(queued.id().to_string(), json["instanceId"].as_str().unwrap());
    assert_eq!(queued.app_type(), "node");
}

#[tokio::test]
async fn provision_accepts_pascal_case_fields() {
    let t = test_app(true);
    let resp = t
        .router
        .oneshot(provision_request(Some(KEY), json!({ "Domain": "blog.example.org" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(t.queue.len(), 1);
}

#[tokio::test]
async fn provision_rejects_bad_input() {
    let t = test_app(true);
    for body in [
        json!({}),
        json!({ "domain": "" }),
        json!({ "domain": "-bad-.example.com" }),
        json!({ "domain": "shop.example.com", "appType": "cobol" }),
    ] {
        let resp = t
            .router
            .clone()
            .oneshot(provision_request(Some(KEY), body.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert!(body_json(resp).await["error"].is_string());
    }
    assert!(t.queue.is_empty());
}

#[tokio::test]
async fn provision_conflicts_with_live_tenant_only() {
    let t = test_app(true);
    t.repo.insert(record("taken.example.com", "Running", Some(6000)));
    t.repo.insert(record("retry.example.com", "Failed", None));

    let resp = t
        .router
        .clone()
        .oneshot(provision_request(Some(KEY), json!({ "domain": "taken.example.com" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = t
        .router
        .oneshot(provision_request(Some(KEY), json!({ "domain": "retry.example.com" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_reports_health_for_running_tenant() {
    let t = test_app(true);
    let tenant = record("shop.example.com", "Running", Some(6001));
    let id = tenant.id;
    t.repo.insert(tenant);

    let resp = t.router.oneshot(get(&format!("/api/status/{id}"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["state"], "Running");
    assert_eq!(json["port"], 6001);
    assert_eq!(json["isHealthy"], true);
    assert_eq!(json["healthStatus"], "Healthy");
}

#[tokio::test]
async fn status_reports_state_while_provisioning() {
    let t = test_app(false);
    let with_port = record("a.example.com", "HealthChecking", Some(6002));
    let without_port = record("b.example.com", "CreatingEnvironment", None);
    let (a, b) = (with_port.id, without_port.id);
    t.repo.insert(with_port);
    t.repo.insert(without_port);

    let json = body_json(t.router.clone().oneshot(get(&format!("/api/status/{a}"))).await.unwrap()).await;
    assert_eq!(json["isHealthy"], false);
    assert_eq!(json["healthStatus"], "HealthChecking");

    let json = body_json(t.router.oneshot(get(&format!("/api/status/{b}"))).await.unwrap()).await;
    assert_eq!(json["healthStatus"], "Unknown");
}

#[tokio::test]
async fn status_rejects_bad_and_unknown_ids() {
    let t = test_app(true);

    let resp = t.router.clone().oneshot(get("/api/status/not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .router
        .oneshot(get(&format!("/api/status/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ssl_returns_processing_for_known_tenant() {
    let t = test_app(true);
    let tenant = record("shop.example.com", "Running", Some(6003));
    let id = tenant.id;
    t.repo.insert(tenant);

    let req = Request::post(format!("/api/ssl/{id}"))
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap();
    let resp = t.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "Processing");
}

#[tokio::test]
async fn probes_need_no_key() {
    let t = test_app(true);

    let resp = t
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");

    let resp = t
        .router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("tenantforge_queue_depth 0"));
    assert!(text.ends_with("# EOF\n"));
}
