use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// OAuth client-credentials configuration for the gateway.
///
/// The audience identifies the gateway the token is requested for and
/// is derived from the gateway address (see [`audience_from_address`]).
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub auth_server_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
}

/// Connection configuration for the workflow engine gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway address in host:port form.
    pub address: String,
    /// Enable transport encryption. Switched on automatically when
    /// OAuth credentials are configured (cloud gateways require TLS).
    pub tls: bool,
    /// Token-based authentication. None for a plain local gateway.
    pub oauth: Option<OAuthConfig>,
    /// Directory process definition files are resolved against.
    pub resource_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:26500".to_string(),
            tls: false,
            oauth: None,
            resource_dir: PathBuf::from("resources"),
        }
    }
}

impl GatewayConfig {
    /// Build the gateway configuration from the environment.
    ///
    /// Reads `ZEEBE_ADDRESS`, `ZEEBE_AUTHORIZATION_SERVER_URL`,
    /// `ZEEBE_CLIENT_ID` and `ZEEBE_CLIENT_SECRET`. The three auth
    /// variables must be set together; a partial set is rejected so a
    /// misconfigured deployment fails at startup instead of at the
    /// first authenticated call.
    pub fn from_env() -> Result<Self> {
        let address = env::var("ZEEBE_ADDRESS").unwrap_or_else(|_| Self::default().address);

        let auth_server_url = env::var("ZEEBE_AUTHORIZATION_SERVER_URL").ok();
        let client_id = env::var("ZEEBE_CLIENT_ID").ok();
        let client_secret = env::var("ZEEBE_CLIENT_SECRET").ok();

        let oauth = match (auth_server_url, client_id, client_secret) {
            (Some(auth_server_url), Some(client_id), Some(client_secret)) => Some(OAuthConfig {
                auth_server_url,
                client_id,
                client_secret,
                audience: audience_from_address(&address),
            }),
            (None, None, None) => None,
            _ => {
                return Err(EngineError::Config(
                    "ZEEBE_AUTHORIZATION_SERVER_URL, ZEEBE_CLIENT_ID and ZEEBE_CLIENT_SECRET \
                     must be set together"
                        .to_string(),
                ))
            }
        };

        let tls = oauth.is_some();
        Ok(Self {
            address,
            tls,
            oauth,
            resource_dir: Self::default().resource_dir,
        })
    }

    pub fn with_resource_dir(mut self, dir: PathBuf) -> Self {
        self.resource_dir = dir;
        self
    }
}

/// Derive the OAuth audience from a gateway address by stripping a
/// trailing `:<port>` suffix.
///
/// Only an actual numeric port is removed. Addresses without a port,
/// including hostnames that happen to end in digits, pass through
/// unchanged.
pub fn audience_from_address(address: &str) -> String {
    match address.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty() && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host.to_string()
        }
        _ => address.to_string(),
    }
}

/// Options for a single registered job worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Cap on handler invocations in flight at once.
    pub max_concurrent_jobs: usize,
    /// Sleep between broker polls when no jobs were activated.
    pub poll_interval: Duration,
    /// Long-poll duration the broker holds an activation request open.
    pub request_timeout: Duration,
    /// Lease duration the broker reserves an activated job for this
    /// worker before re-offering it.
    pub job_timeout: Duration,
    /// When true, a successful handler return completes the job with
    /// the returned variables. When false the handler must issue the
    /// completion call itself.
    pub auto_complete: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            poll_interval: Duration::from_secs(50),
            request_timeout: Duration::from_secs(50),
            job_timeout: Duration::from_secs(10),
            auto_complete: true,
        }
    }
}

impl WorkerOptions {
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }
}

/// Configuration for the HTTP facade and the demo process it starts.
#[derive(Debug, Clone)]
pub struct FacadeConfig {
    pub listen_addr: SocketAddr,
    /// Process started by `GET /start`.
    pub process_id: String,
    /// Process definition file deployed at startup, resolved against
    /// the gateway resource directory.
    pub model_file: String,
    /// Downstream service the get-time worker calls.
    pub time_api_url: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8080"
                .parse()
                .expect("default listen address is valid"),
            process_id: "test-process".to_string(),
            model_file: "test-process.bpmn".to_string(),
            time_api_url: "https://json-api.joshwulf.com/time".to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub facade: FacadeConfig,
}

impl AppConfig {
    /// Gateway settings from the environment, facade defaults. CLI
    /// flags override individual fields afterwards.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gateway: GatewayConfig::from_env()?,
            facade: FacadeConfig::default(),
        })
    }
}
