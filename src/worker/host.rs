use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerOptions;
use crate::error::Result;
use crate::gateway::{ActivatedJob, GatewayClient};

/// Broker capability handed to job handlers.
///
/// Handlers running with `auto_complete` off use this to issue the
/// completion call themselves; handlers may also fail a job explicitly
/// to shorten the broker-side retry wait.
#[derive(Clone)]
pub struct JobClient {
    gateway: GatewayClient,
}

impl JobClient {
    pub fn new(gateway: GatewayClient) -> Self {
        Self { gateway }
    }

    pub async fn complete(&self, job_key: i64, variables: Option<Value>) -> Result<()> {
        self.gateway.complete_job(job_key, variables).await
    }

    pub async fn fail(&self, job_key: i64, retries: i32, error_message: &str) -> Result<()> {
        self.gateway.fail_job(job_key, retries, error_message).await
    }
}

/// A unit of business logic invoked for each activated job.
///
/// Returning `Ok(vars)` under `auto_complete` makes the host complete
/// the job with those variables. Returning `Err` leaves the job with
/// the broker: its lease expires and it is re-offered, so handlers
/// must tolerate at-least-once delivery.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, client: &JobClient, job: ActivatedJob) -> Result<Option<Value>>;
}

struct Registration {
    handler: Arc<dyn JobHandler>,
    options: WorkerOptions,
}

/// Hosts one polling worker per registered job type.
///
/// Each worker runs an independent long-poll loop against the broker,
/// admits at most `max_concurrent_jobs` handler invocations at a time
/// and never lets a handler failure escape its own slot.
pub struct WorkerHost {
    gateway: GatewayClient,
    workers: HashMap<String, Registration>,
}

impl WorkerHost {
    pub fn new(gateway: GatewayClient) -> Self {
        Self {
            gateway,
            workers: HashMap::new(),
        }
    }

    /// Register a handler for a job type. Registering the same type
    /// again replaces the previous handler.
    pub fn register(
        &mut self,
        job_type: impl Into<String>,
        handler: impl JobHandler,
        options: WorkerOptions,
    ) {
        let job_type = job_type.into();
        if self
            .workers
            .insert(
                job_type.clone(),
                Registration {
                    handler: Arc::new(handler),
                    options,
                },
            )
            .is_some()
        {
            tracing::warn!(job_type = %job_type, "Replacing previously registered job handler");
        }
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.workers.keys().map(String::as_str).collect()
    }

    /// Run all registered workers until the token is cancelled.
    ///
    /// Poll-cycle errors are logged and retried, never fatal. Jobs in
    /// flight at cancellation finish on their own; their leases cover
    /// the broker side.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut handles = Vec::new();
        for (job_type, registration) in self.workers {
            let gateway = self.gateway.clone();
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                poll_loop(job_type, registration, gateway, token).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// The polling loop for one job type.
///
/// A semaphore is the admission gate: the loop only ever requests as
/// many jobs as it has free permits, and every spawned handler holds
/// one permit for its lifetime, so in-flight invocations can never
/// exceed `max_concurrent_jobs`.
async fn poll_loop(
    job_type: String,
    registration: Registration,
    gateway: GatewayClient,
    shutdown: CancellationToken,
) {
    let options = registration.options;
    let handler = registration.handler;
    let semaphore = Arc::new(Semaphore::new(options.max_concurrent_jobs));
    let job_client = JobClient::new(gateway.clone());

    tracing::info!(
        job_type = %job_type,
        max_concurrent_jobs = options.max_concurrent_jobs,
        "Starting job worker"
    );

    'poll: loop {
        if shutdown.is_cancelled() {
            break;
        }

        let capacity = semaphore.available_permits();
        if capacity == 0 {
            // All slots busy: wait for one to free up rather than
            // sending a zero-capacity activation request.
            tokio::select! {
                permit = semaphore.clone().acquire_owned() => {
                    drop(permit);
                    continue;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        let activation = tokio::select! {
            result = gateway.activate_jobs(&job_type, capacity as i32, &options) => result,
            _ = shutdown.cancelled() => break,
        };

        let mut stream = match activation {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(job_type = %job_type, error = %e, "Job activation failed, retrying");
                idle_sleep(&shutdown, options.poll_interval).await;
                continue;
            }
        };

        let mut activated = 0usize;
        loop {
            let message = tokio::select! {
                message = stream.message() => message,
                _ = shutdown.cancelled() => break 'poll,
            };

            match message {
                Ok(Some(batch)) => {
                    for raw in batch.jobs {
                        let job = match ActivatedJob::try_from(raw) {
                            Ok(job) => job,
                            Err(e) => {
                                tracing::warn!(
                                    job_type = %job_type,
                                    error = %e,
                                    "Dropping job with malformed payload"
                                );
                                continue;
                            }
                        };
                        activated += 1;

                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break 'poll,
                        };
                        let handler = handler.clone();
                        let client = job_client.clone();
                        let auto_complete = options.auto_complete;
                        tokio::spawn(async move {
                            let _permit = permit;
                            run_job(handler, client, job, auto_complete).await;
                        });
                    }
                }
                Ok(None) => break,
                Err(status) => {
                    tracing::warn!(
                        job_type = %job_type,
                        error = %status,
                        "Job activation stream failed, retrying"
                    );
                    break;
                }
            }
        }

        if activated == 0 {
            idle_sleep(&shutdown, options.poll_interval).await;
        }
    }

    tracing::info!(job_type = %job_type, "Job worker stopped");
}

/// Invoke a handler for one job and report the outcome to the broker.
///
/// A failed handler (or a failed completion call) only logs: the job
/// lease expires broker-side and the job is re-offered, so no
/// host-level retry is needed and later jobs proceed unaffected.
async fn run_job(
    handler: Arc<dyn JobHandler>,
    client: JobClient,
    job: ActivatedJob,
    auto_complete: bool,
) {
    let job_key = job.key;
    let job_type = job.job_type.clone();
    tracing::debug!(job_key, job_type = %job_type, "Received job");

    match handler.handle(&client, job).await {
        Ok(variables) => {
            if auto_complete {
                match client.complete(job_key, variables).await {
                    Ok(()) => {
                        tracing::info!(job_key, job_type = %job_type, "Job completed");
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_key,
                            job_type = %job_type,
                            error = %e,
                            "Job completion failed, lease will expire"
                        );
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                job_key,
                job_type = %job_type,
                error = %e,
                "Job handler failed, leaving job to lease expiry"
            );
        }
    }
}

/// Sleep for the poll interval plus a small jitter, waking early on
/// shutdown. Jitter keeps a fleet of workers from polling in lockstep.
async fn idle_sleep(shutdown: &CancellationToken, interval: Duration) {
    let jitter_cap = (interval.as_millis() as u64 / 10).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_cap);
    tokio::select! {
        _ = tokio::time::sleep(interval + Duration::from_millis(jitter)) => {}
        _ = shutdown.cancelled() => {}
    }
}
