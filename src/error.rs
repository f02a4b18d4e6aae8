use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource error: {0}")]
    Resource(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed broker response: {0}")]
    Broker(String),

    #[error("Job handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
