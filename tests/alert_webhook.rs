use serde_json::json;
use tenantforge::alert::{sign, WebhookAlertService, SIGNATURE_HEADER};
use tenantforge::tenant::traits::AlertService;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn rollback_alert_is_posted_and_signed() {
    let server = MockServer::start().await;
    let tenant_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/hooks/rollback"))
        .and(header("content-type", "application/json"))
        .and(header_exists(SIGNATURE_HEADER))
        .and(body_partial_json(json!({
            "EventType": "Rollback",
            "TenantId": tenant_id,
            "Domain": "shop.example.com",
            "Reason": "health check failed",
            "Severity": "high",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let alerts = WebhookAlertService::new(
        Some(format!("{}/hooks/rollback", server.uri())),
        Some("hook-secret".into()),
    )
    .unwrap();
    alerts
        .send_rollback_alert(tenant_id, "shop.example.com", "health check failed")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let delivered = &requests[0];
    let signature = delivered
        .headers
        .get(SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(signature, sign("hook-secret", &delivered.body).unwrap());
}

#[tokio::test]
async fn unsigned_without_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let alerts = WebhookAlertService::new(Some(server.uri()), None).unwrap();
    alerts
        .send_rollback_alert(Uuid::new_v4(), "a.example.com", "boom")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn rejected_delivery_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let alerts = WebhookAlertService::new(Some(server.uri()), None).unwrap();
    let err = alerts
        .send_rollback_alert(Uuid::new_v4(), "a.example.com", "boom")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}
