use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tonic::codec::Streaming;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::config::{GatewayConfig, WorkerOptions};
use crate::error::{EngineError, Result};
use crate::gateway::auth::OAuthProvider;
use crate::proto;
use crate::proto::gateway_client::GatewayClient as RpcClient;

/// Snapshot of broker cluster membership and partition health.
#[derive(Debug, Clone)]
pub struct Topology {
    pub brokers: Vec<BrokerInfo>,
    pub cluster_size: i32,
    pub partitions_count: i32,
    pub replication_factor: i32,
    pub gateway_version: String,
}

#[derive(Debug, Clone)]
pub struct BrokerInfo {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub partitions: Vec<PartitionInfo>,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub partition_id: i32,
    pub role: String,
    pub health: String,
}

impl From<proto::TopologyResponse> for Topology {
    fn from(resp: proto::TopologyResponse) -> Self {
        let brokers = resp
            .brokers
            .into_iter()
            .map(|b| BrokerInfo {
                node_id: b.node_id,
                host: b.host,
                port: b.port,
                partitions: b
                    .partitions
                    .into_iter()
                    .map(|p| PartitionInfo {
                        partition_id: p.partition_id,
                        role: partition_role_name(p.role),
                        health: partition_health_name(p.health),
                    })
                    .collect(),
                version: b.version,
            })
            .collect();
        Self {
            brokers,
            cluster_size: resp.cluster_size,
            partitions_count: resp.partitions_count,
            replication_factor: resp.replication_factor,
            gateway_version: resp.gateway_version,
        }
    }
}

fn partition_role_name(role: i32) -> String {
    match proto::partition::PartitionBrokerRole::try_from(role) {
        Ok(proto::partition::PartitionBrokerRole::Leader) => "leader",
        Ok(proto::partition::PartitionBrokerRole::Follower) => "follower",
        Ok(proto::partition::PartitionBrokerRole::Inactive) => "inactive",
        Err(_) => "unknown",
    }
    .to_string()
}

fn partition_health_name(health: i32) -> String {
    match proto::partition::PartitionBrokerHealth::try_from(health) {
        Ok(proto::partition::PartitionBrokerHealth::Healthy) => "healthy",
        Ok(proto::partition::PartitionBrokerHealth::Unhealthy) => "unhealthy",
        Ok(proto::partition::PartitionBrokerHealth::Dead) => "dead",
        Err(_) => "unknown",
    }
    .to_string()
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "cluster size: {}, partitions: {}, replication factor: {}, gateway version: {}",
            self.cluster_size, self.partitions_count, self.replication_factor, self.gateway_version
        )?;
        for broker in &self.brokers {
            writeln!(
                f,
                "  broker {} at {}:{} ({})",
                broker.node_id, broker.host, broker.port, broker.version
            )?;
            for partition in &broker.partitions {
                writeln!(
                    f,
                    "    partition {}: {}, {}",
                    partition.partition_id, partition.role, partition.health
                )?;
            }
        }
        Ok(())
    }
}

/// Result of deploying a process definition resource.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Deployment {
    pub process_definition_key: i64,
    pub bpmn_process_id: String,
    pub version: i32,
    pub resource_name: String,
}

/// Result of creating a process instance. `variables` carries the
/// final instance variables when the caller waited for completion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstanceResult {
    pub process_instance_key: i64,
    pub bpmn_process_id: String,
    pub version: i32,
    pub variables: Option<Value>,
}

/// One unit of work leased to this worker by the broker.
#[derive(Debug, Clone)]
pub struct ActivatedJob {
    pub key: i64,
    pub job_type: String,
    pub process_instance_key: i64,
    pub element_id: String,
    pub custom_headers: HashMap<String, String>,
    pub variables: Value,
    pub retries: i32,
    /// Epoch milliseconds at which the broker re-offers the job.
    pub deadline_ms: i64,
}

impl TryFrom<proto::ActivatedJob> for ActivatedJob {
    type Error = EngineError;

    fn try_from(raw: proto::ActivatedJob) -> Result<Self> {
        let custom_headers = parse_json_map(&raw.custom_headers)?;
        let variables = parse_json_object(&raw.variables)?;
        Ok(Self {
            key: raw.key,
            job_type: raw.job_type,
            process_instance_key: raw.process_instance_key,
            element_id: raw.element_id,
            custom_headers,
            variables,
            retries: raw.retries,
            deadline_ms: raw.deadline,
        })
    }
}

fn parse_json_map(raw: &str) -> Result<HashMap<String, String>> {
    if raw.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn parse_json_object(raw: &str) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    Ok(serde_json::from_str(raw)?)
}

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);
/// Slack added on top of the broker-side long-poll before the client
/// gives up on an activation request.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Typed client for the workflow engine gateway.
///
/// Cheap to clone: the underlying channel is shared and multiplexed,
/// the token provider is reference-counted. The channel connects
/// lazily, so construction succeeds even while the broker is down and
/// individual calls surface connectivity errors instead.
#[derive(Clone)]
pub struct GatewayClient {
    inner: RpcClient<Channel>,
    auth: Option<Arc<OAuthProvider>>,
}

impl GatewayClient {
    pub fn connect(config: &GatewayConfig) -> Result<Self> {
        let scheme = if config.tls { "https" } else { "http" };
        let uri = format!("{}://{}", scheme, config.address);

        let mut endpoint = Endpoint::from_shared(uri)?
            .keep_alive_while_idle(true)
            .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(KEEP_ALIVE_TIMEOUT);
        if config.tls {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        let channel = endpoint.connect_lazy();

        let auth = match &config.oauth {
            Some(oauth) => Some(Arc::new(OAuthProvider::new(oauth.clone())?)),
            None => None,
        };

        tracing::info!(address = %config.address, tls = config.tls, "Gateway client configured");
        Ok(Self {
            inner: RpcClient::new(channel),
            auth,
        })
    }

    /// Wrap a message in a request, attaching a bearer token when
    /// authentication is configured.
    async fn request<T>(&self, message: T) -> Result<tonic::Request<T>> {
        let mut request = tonic::Request::new(message);
        if let Some(auth) = &self.auth {
            let token = auth.access_token().await?;
            let value: MetadataValue<_> = format!("Bearer {}", token)
                .parse()
                .map_err(|_| EngineError::Auth("access token is not valid metadata".to_string()))?;
            request.metadata_mut().insert("authorization", value);
        }
        Ok(request)
    }

    pub async fn topology(&self) -> Result<Topology> {
        let request = self.request(proto::TopologyRequest {}).await?;
        let response = self.inner.clone().topology(request).await?.into_inner();
        Ok(Topology::from(response))
    }

    /// Deploy a process definition file. The broker returns a fresh
    /// descriptor on every call, bumping the version when the content
    /// changed.
    pub async fn deploy_resource(&self, path: &Path) -> Result<Deployment> {
        let content = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                EngineError::Config(format!("resource path {} has no file name", path.display()))
            })?;

        let request = self
            .request(proto::DeployResourceRequest {
                resources: vec![proto::Resource { name, content }],
            })
            .await?;
        let response = self
            .inner
            .clone()
            .deploy_resource(request)
            .await?
            .into_inner();

        let process = response
            .processes
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Broker("deployment contained no process".to_string()))?;
        Ok(Deployment {
            process_definition_key: process.process_definition_key,
            bpmn_process_id: process.bpmn_process_id,
            version: process.version,
            resource_name: process.resource_name,
        })
    }

    /// Create an instance of the latest version of a process. With
    /// `with_result` the gateway blocks until the instance finishes
    /// and the result carries its final variables.
    pub async fn create_instance(
        &self,
        process_id: &str,
        variables: Value,
        with_result: bool,
    ) -> Result<InstanceResult> {
        let inner_request = proto::CreateProcessInstanceRequest {
            bpmn_process_id: process_id.to_string(),
            version: -1,
            variables: variables.to_string(),
        };

        if with_result {
            let request = self
                .request(proto::CreateProcessInstanceWithResultRequest {
                    request: Some(inner_request),
                    request_timeout: 0,
                })
                .await?;
            let response = self
                .inner
                .clone()
                .create_process_instance_with_result(request)
                .await?
                .into_inner();
            Ok(InstanceResult {
                process_instance_key: response.process_instance_key,
                bpmn_process_id: response.bpmn_process_id,
                version: response.version,
                variables: Some(parse_json_object(&response.variables)?),
            })
        } else {
            let request = self.request(inner_request).await?;
            let response = self
                .inner
                .clone()
                .create_process_instance(request)
                .await?
                .into_inner();
            Ok(InstanceResult {
                process_instance_key: response.process_instance_key,
                bpmn_process_id: response.bpmn_process_id,
                version: response.version,
                variables: None,
            })
        }
    }

    /// Long-poll for up to `max_jobs` jobs of a type. The returned
    /// stream yields batches until the broker closes the poll.
    pub async fn activate_jobs(
        &self,
        job_type: &str,
        max_jobs: i32,
        options: &WorkerOptions,
    ) -> Result<Streaming<proto::ActivateJobsResponse>> {
        let mut request = self
            .request(proto::ActivateJobsRequest {
                job_type: job_type.to_string(),
                worker: job_type.to_string(),
                timeout: options.job_timeout.as_millis() as i64,
                max_jobs_to_activate: max_jobs,
                request_timeout: options.request_timeout.as_millis() as i64,
            })
            .await?;
        request.set_timeout(options.request_timeout + REQUEST_TIMEOUT_SLACK);

        let response = self.inner.clone().activate_jobs(request).await?;
        Ok(response.into_inner())
    }

    pub async fn complete_job(&self, job_key: i64, variables: Option<Value>) -> Result<()> {
        let variables = variables.map(|v| v.to_string()).unwrap_or_default();
        let request = self
            .request(proto::CompleteJobRequest { job_key, variables })
            .await?;
        self.inner.clone().complete_job(request).await?;
        Ok(())
    }

    pub async fn fail_job(&self, job_key: i64, retries: i32, error_message: &str) -> Result<()> {
        let request = self
            .request(proto::FailJobRequest {
                job_key,
                retries,
                error_message: error_message.to_string(),
            })
            .await?;
        self.inner.clone().fail_job(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activated_job_conversion_parses_headers_and_variables() {
        let raw = proto::ActivatedJob {
            key: 42,
            job_type: "make-greeting".to_string(),
            process_instance_key: 7,
            bpmn_process_id: "test-process".to_string(),
            process_definition_key: 1,
            element_id: "Task_MakeGreeting".to_string(),
            custom_headers: r#"{"greeting":"Hello"}"#.to_string(),
            worker: "make-greeting".to_string(),
            retries: 3,
            deadline: 1_000,
            variables: r#"{"name":"World"}"#.to_string(),
        };

        let job = ActivatedJob::try_from(raw).unwrap();
        assert_eq!(job.key, 42);
        assert_eq!(job.custom_headers.get("greeting").unwrap(), "Hello");
        assert_eq!(job.variables["name"], "World");
        assert_eq!(job.deadline_ms, 1_000);
    }

    #[test]
    fn activated_job_conversion_tolerates_empty_payloads() {
        let raw = proto::ActivatedJob {
            key: 1,
            job_type: "get-time".to_string(),
            ..Default::default()
        };

        let job = ActivatedJob::try_from(raw).unwrap();
        assert!(job.custom_headers.is_empty());
        assert_eq!(job.variables, serde_json::json!({}));
    }

    #[test]
    fn activated_job_conversion_rejects_bad_json() {
        let raw = proto::ActivatedJob {
            key: 1,
            variables: "{not json".to_string(),
            ..Default::default()
        };
        assert!(ActivatedJob::try_from(raw).is_err());
    }

    #[test]
    fn topology_rendering_is_never_empty() {
        let topology = Topology::from(proto::TopologyResponse::default());
        let rendered = topology.to_string();
        assert!(rendered.contains("cluster size"));

        let topology = Topology::from(proto::TopologyResponse {
            brokers: vec![proto::BrokerInfo {
                node_id: 0,
                host: "broker-0".to_string(),
                port: 26501,
                partitions: vec![proto::Partition {
                    partition_id: 1,
                    role: proto::partition::PartitionBrokerRole::Leader as i32,
                    health: proto::partition::PartitionBrokerHealth::Healthy as i32,
                }],
                version: "8.4.0".to_string(),
            }],
            cluster_size: 1,
            partitions_count: 1,
            replication_factor: 1,
            gateway_version: "8.4.0".to_string(),
        });
        let rendered = topology.to_string();
        assert!(rendered.contains("broker 0 at broker-0:26501"));
        assert!(rendered.contains("partition 1: leader, healthy"));
    }
}
