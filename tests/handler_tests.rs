//! Unit-style tests for the demo job handlers, with a local HTTP stub
//! standing in for the downstream time service.


use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use serde_json::{json, Value};

use test_harness::test_gateway_config;
use zeebe_starter::gateway::{ActivatedJob, GatewayClient};
use zeebe_starter::worker::{GreetingHandler, JobClient, JobHandler, TimeHandler};

/// A job client the handlers under test never actually use; the lazy
/// channel means nothing connects unless a call is made.
fn idle_job_client() -> JobClient {
    let config = test_gateway_config("127.0.0.1:9".parse().unwrap());
    JobClient::new(GatewayClient::connect(&config).unwrap())
}

fn job(headers: &[(&str, &str)], variables: Value) -> ActivatedJob {
    ActivatedJob {
        key: 1,
        job_type: "test".to_string(),
        process_instance_key: 100,
        element_id: "Task_Test".to_string(),
        custom_headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        variables,
        retries: 3,
        deadline_ms: 10_000,
    }
}

async fn spawn_stub(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_greeting_combines_header_and_variable() {
    let client = idle_job_client();
    let job = job(&[("greeting", "Hello")], json!({ "name": "World" }));

    let output = GreetingHandler.handle(&client, job).await.unwrap();
    assert_eq!(output, Some(json!({ "say": "Hello World" })));
}

#[tokio::test]
async fn test_greeting_fails_without_greeting_header() {
    let client = idle_job_client();
    let job = job(&[], json!({ "name": "World" }));

    let err = GreetingHandler.handle(&client, job).await.unwrap_err();
    assert!(err.to_string().contains("greeting"));
}

#[tokio::test]
async fn test_greeting_fails_without_name_variable() {
    let client = idle_job_client();
    let job = job(&[("greeting", "Hello")], json!({}));

    let err = GreetingHandler.handle(&client, job).await.unwrap_err();
    assert!(err.to_string().contains("name"));
}

#[tokio::test]
async fn test_get_time_passes_body_through_unchanged() {
    const BODY: &str = r#"{"time":"2024-05-01T12:00:00.000Z","hour":12,"minute":0}"#;
    let addr = spawn_stub(Router::new().route("/time", get(|| async { BODY }))).await;

    let handler = TimeHandler::new(format!("http://{}/time", addr)).unwrap();
    let output = handler
        .handle(&idle_job_client(), job(&[], json!({})))
        .await
        .unwrap();

    // Exact pass-through: the completion payload embeds the body the
    // time service returned, with no transformation.
    let expected: Value = serde_json::from_str(BODY).unwrap();
    assert_eq!(output, Some(json!({ "time": expected })));
}

#[tokio::test]
async fn test_get_time_rejects_non_json_body() {
    let addr = spawn_stub(Router::new().route("/time", get(|| async { "twelve o'clock" }))).await;

    let handler = TimeHandler::new(format!("http://{}/time", addr)).unwrap();
    let err = handler
        .handle(&idle_job_client(), job(&[], json!({})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("non-JSON"));
}

#[tokio::test]
async fn test_get_time_surfaces_downstream_failure() {
    let addr = spawn_stub(Router::new().route(
        "/time",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await;

    let handler = TimeHandler::new(format!("http://{}/time", addr)).unwrap();
    let err = handler
        .handle(&idle_job_client(), job(&[], json!({})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_get_time_surfaces_unreachable_service() {
    let handler = TimeHandler::new("http://127.0.0.1:9/time").unwrap();
    let result = handler.handle(&idle_job_client(), job(&[], json!({}))).await;
    assert!(result.is_err());
}
