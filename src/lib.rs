pub mod config;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod service;
pub mod shutdown;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("gateway_protocol");
}
