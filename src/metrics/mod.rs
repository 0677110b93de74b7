//! Metrics and monitoring for the Chance-It server
//!
//! Prometheus metrics plus an HTTP server for health probes and scraping.

pub mod collector;
pub mod health;

pub use collector::{GameMetrics, MatchmakingMetrics, MetricsCollector, PoolMetrics, ServiceMetrics};
pub use health::{HealthServer, HealthServerConfig};
