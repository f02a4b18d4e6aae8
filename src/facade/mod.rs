//! Thin HTTP facade over the workflow service.
//!
//! Two read endpoints, no request bodies, no authentication:
//! - `GET /status`: textual rendering of the broker cluster topology
//! - `GET /start`: start the configured demo process and return the
//!   instance result as JSON
//!
//! Gateway failures surface as 502 responses carrying the error text;
//! an unreachable broker is never rendered as an empty success.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::EngineError;
use crate::service::WorkflowService;

#[derive(Clone)]
pub struct FacadeState {
    pub service: WorkflowService,
    /// Process started by `GET /start`.
    pub process_id: String,
}

#[derive(Serialize)]
struct InstanceStartedResponse {
    process_instance_key: i64,
    bpmn_process_id: String,
    version: i32,
    variables: Option<Value>,
}

struct FacadeError(EngineError);

impl From<EngineError> for FacadeError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for FacadeError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_GATEWAY,
            format!("workflow engine request failed: {}", self.0),
        )
            .into_response()
    }
}

pub fn router(state: FacadeState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/start", get(start_handler))
        .with_state(state)
}

pub async fn run_facade(addr: SocketAddr, state: FacadeState, shutdown: CancellationToken) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    tracing::info!(addr = %addr, "Starting HTTP facade");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind HTTP facade");
            return;
        }
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "HTTP facade failed");
    }
}

async fn status_handler(State(state): State<FacadeState>) -> Result<String, FacadeError> {
    let topology = state.service.status().await?;
    Ok(topology.to_string())
}

async fn start_handler(
    State(state): State<FacadeState>,
) -> Result<Json<InstanceStartedResponse>, FacadeError> {
    let instance = state.service.start_instance(&state.process_id).await?;
    Ok(Json(InstanceStartedResponse {
        process_instance_key: instance.process_instance_key,
        bpmn_process_id: instance.bpmn_process_id,
        version: instance.version,
        variables: instance.variables,
    }))
}
