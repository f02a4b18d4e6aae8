//! Job worker host: polls the broker for work and dispatches it.
//!
//! # Components
//!
//! - [`WorkerHost`]: registry of job-type handlers; runs one polling
//!   loop per registered type
//! - [`JobHandler`]: the unit of business logic invoked per job
//! - [`handlers`]: the demo handlers (get-time, make-greeting)
//!
//! # Processing Flow
//!
//! 1. Each worker long-polls the gateway for jobs of its type, asking
//!    for no more jobs than it has free concurrency slots
//! 2. Every activated job runs in its own task holding one slot
//! 3. On success the host completes the job with the handler's output
//!    variables; on failure the job is left to its lease expiry and
//!    the broker re-offers it
//!
//! Delivery is at-least-once: a handler that outlives the job lease
//! may see the same job again on another slot or another worker.

pub mod handlers;
pub mod host;

pub use handlers::{GreetingHandler, TimeHandler};
pub use host::{JobClient, JobHandler, WorkerHost};
