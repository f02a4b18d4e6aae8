//! Tests for the workflow service capability surface.


use test_harness::{connect_client, spawn_fake_gateway, test_app_config, FakeGateway};
use zeebe_starter::error::EngineError;
use zeebe_starter::service::WorkflowService;
use zeebe_starter::worker::WorkerHost;

#[tokio::test]
async fn test_deploy_resolves_against_resource_dir() {
    let fake = FakeGateway::new();
    let (addr, _server) = spawn_fake_gateway(fake).await;
    let config = test_app_config(addr);
    let service = WorkflowService::new(connect_client(addr), &config);

    let deployment = service.deploy("test-process.bpmn").await.unwrap();
    assert_eq!(deployment.bpmn_process_id, "test-process");
    assert_eq!(deployment.resource_name, "test-process.bpmn");
}

#[tokio::test]
async fn test_deploy_missing_model_is_a_resource_error() {
    let fake = FakeGateway::new();
    let (addr, _server) = spawn_fake_gateway(fake).await;
    let config = test_app_config(addr);
    let service = WorkflowService::new(connect_client(addr), &config);

    let err = service.deploy("missing.bpmn").await.unwrap_err();
    assert!(matches!(err, EngineError::Resource(_)));
}

#[tokio::test]
async fn test_register_workers_installs_demo_handlers() {
    let fake = FakeGateway::new();
    let (addr, _server) = spawn_fake_gateway(fake).await;
    let config = test_app_config(addr);
    let gateway = connect_client(addr);
    let service = WorkflowService::new(gateway.clone(), &config);

    let mut host = WorkerHost::new(gateway);
    service.register_workers(&mut host).unwrap();

    let mut types = host.registered_types();
    types.sort_unstable();
    assert_eq!(types, vec!["get-time", "make-greeting"]);
}

#[tokio::test]
async fn test_start_instance_waits_for_result() {
    let fake = FakeGateway::new();
    let (addr, _server) = spawn_fake_gateway(fake).await;
    let config = test_app_config(addr);
    let service = WorkflowService::new(connect_client(addr), &config);

    let result = service.start_instance("test-process").await.unwrap();
    assert_eq!(result.bpmn_process_id, "test-process");
    // with_result: the demo initial variables come back as the final
    // instance variables through the fake broker.
    assert_eq!(result.variables.unwrap()["name"], "Josh Wulf");
}
