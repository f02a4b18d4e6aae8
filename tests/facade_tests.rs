//! HTTP facade tests: topology rendering, instance start, and the
//! fail-loud contract when the broker is unreachable.


use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use test_harness::{spawn_fake_gateway, test_app_config, FakeGateway};
use zeebe_starter::config::{AppConfig, GatewayConfig};
use zeebe_starter::facade::{router, FacadeState};
use zeebe_starter::gateway::GatewayClient;
use zeebe_starter::service::WorkflowService;

fn facade_state(config: &AppConfig) -> FacadeState {
    let gateway = GatewayClient::connect(&config.gateway).expect("connect gateway client");
    FacadeState {
        service: WorkflowService::new(gateway, config),
        process_id: config.facade.process_id.clone(),
    }
}

async fn get(state: FacadeState, uri: &str) -> (StatusCode, String) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_status_renders_topology() {
    let fake = FakeGateway::new();
    fake.set_topology(3).await;
    let (addr, _server) = spawn_fake_gateway(fake).await;

    let (status, body) = get(facade_state(&test_app_config(addr)), "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.trim().is_empty());
    assert!(body.contains("cluster size: 3"));
    assert!(body.contains("broker 0 at broker-0:26501"));
}

#[tokio::test]
async fn test_status_fails_loudly_when_broker_unreachable() {
    // Nothing listens on the discard port; the call must surface the
    // failure, not render an empty topology.
    let config = AppConfig {
        gateway: GatewayConfig {
            address: "127.0.0.1:9".to_string(),
            ..GatewayConfig::default()
        },
        ..AppConfig::default()
    };

    let (status, body) = get(facade_state(&config), "/status").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("workflow engine request failed"));
}

#[tokio::test]
async fn test_start_returns_instance_result() {
    let fake = FakeGateway::new();
    let (addr, _server) = spawn_fake_gateway(fake).await;

    let (status, body) = get(facade_state(&test_app_config(addr)), "/start").await;

    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["bpmn_process_id"], "test-process");
    assert!(result["process_instance_key"].as_i64().unwrap() > 0);
    // The demo initial variables round-trip through the fake broker.
    assert_eq!(result["variables"]["name"], "Josh Wulf");
}

#[tokio::test]
async fn test_start_fails_loudly_when_broker_unreachable() {
    let config = AppConfig {
        gateway: GatewayConfig {
            address: "127.0.0.1:9".to_string(),
            ..GatewayConfig::default()
        },
        ..AppConfig::default()
    };

    let (status, body) = get(facade_state(&config), "/start").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("workflow engine request failed"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let fake = FakeGateway::new();
    let (addr, _server) = spawn_fake_gateway(fake).await;

    let (status, _body) = get(facade_state(&test_app_config(addr)), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
