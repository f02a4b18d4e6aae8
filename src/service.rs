use std::path::PathBuf;

use serde_json::json;

use crate::config::{AppConfig, WorkerOptions};
use crate::error::Result;
use crate::gateway::{Deployment, GatewayClient, InstanceResult, Topology};
use crate::worker::{GreetingHandler, TimeHandler, WorkerHost};

/// The one stable capability surface over the workflow engine:
/// deploy a model, inspect the cluster, start an instance, register
/// the demo workers. The HTTP facade and the CLI both go through this
/// type rather than the gateway client directly.
#[derive(Clone)]
pub struct WorkflowService {
    gateway: GatewayClient,
    resource_dir: PathBuf,
    time_api_url: String,
}

impl WorkflowService {
    pub fn new(gateway: GatewayClient, config: &AppConfig) -> Self {
        Self {
            gateway,
            resource_dir: config.gateway.resource_dir.clone(),
            time_api_url: config.facade.time_api_url.clone(),
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Deploy a process definition file from the resource directory.
    pub async fn deploy(&self, model_file: &str) -> Result<Deployment> {
        let path = self.resource_dir.join(model_file);
        let deployment = self.gateway.deploy_resource(&path).await?;
        tracing::info!(
            process_id = %deployment.bpmn_process_id,
            version = deployment.version,
            "Deployed process model"
        );
        Ok(deployment)
    }

    /// Snapshot of broker cluster topology, fetched on demand.
    pub async fn status(&self) -> Result<Topology> {
        self.gateway.topology().await
    }

    /// Start an instance of the latest version of a process and wait
    /// for its result. The initial variables feed the make-greeting
    /// task in the demo model.
    pub async fn start_instance(&self, process_id: &str) -> Result<InstanceResult> {
        tracing::info!(process_id = %process_id, "Creating process instance");
        self.gateway
            .create_instance(process_id, json!({ "name": "Josh Wulf" }), true)
            .await
    }

    /// Install the demo job handlers on a worker host.
    pub fn register_workers(&self, host: &mut WorkerHost) -> Result<()> {
        host.register(
            "get-time",
            TimeHandler::new(self.time_api_url.clone())?,
            WorkerOptions::default(),
        );
        host.register("make-greeting", GreetingHandler, WorkerOptions::default());
        Ok(())
    }
}
