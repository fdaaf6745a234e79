mod system;

pub use system::{caller, health, unknown_endpoint, CallerResponse, HealthResponse};
