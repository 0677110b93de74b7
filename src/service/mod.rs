//! Service layer for the Chance-It server
//!
//! Application state, pool wiring and background task management.

pub mod app;
pub mod health;

pub use app::{AppState, PoolLoad, ServiceError};
pub use health::{HealthCheck, HealthStatus};
