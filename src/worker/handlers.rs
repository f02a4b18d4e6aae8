use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{EngineError, Result};
use crate::gateway::ActivatedJob;
use crate::worker::host::{JobClient, JobHandler};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Completes `get-time` jobs with the current time fetched from a
/// downstream time service.
pub struct TimeHandler {
    http: reqwest::Client,
    url: String,
}

impl TimeHandler {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl JobHandler for TimeHandler {
    async fn handle(&self, _client: &JobClient, job: ActivatedJob) -> Result<Option<Value>> {
        tracing::info!(job_key = job.key, "Fetching current time");

        let response = self.http.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Handler(format!(
                "time service returned {}",
                status
            )));
        }

        // The response body is embedded as-is under "time"; the worker
        // adds no interpretation of its own.
        let body = response.text().await?;
        let time: Value = serde_json::from_str(body.trim()).map_err(|e| {
            EngineError::Handler(format!("time service returned a non-JSON body: {}", e))
        })?;

        Ok(Some(json!({ "time": time })))
    }
}

#[derive(Debug, Deserialize)]
struct GreetingVariables {
    name: String,
}

/// Completes `make-greeting` jobs by combining the `greeting` custom
/// header with the `name` process variable.
pub struct GreetingHandler;

#[async_trait::async_trait]
impl JobHandler for GreetingHandler {
    async fn handle(&self, _client: &JobClient, job: ActivatedJob) -> Result<Option<Value>> {
        tracing::info!(job_key = job.key, "Making greeting");

        let greeting = job.custom_headers.get("greeting").ok_or_else(|| {
            EngineError::Handler("job is missing the greeting custom header".to_string())
        })?;
        let variables: GreetingVariables = serde_json::from_value(job.variables.clone())
            .map_err(|e| EngineError::Handler(format!("job variables are missing name: {}", e)))?;

        Ok(Some(json!({
            "say": format!("{} {}", greeting, variables.name)
        })))
    }
}
