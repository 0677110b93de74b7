//! Health checks and service statistics
//!
//! Readiness and liveness probes derived from the running flag, the worker
//! pools and the matchmaking queue.

use crate::service::app::{AppState, PoolLoad};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Combine two statuses, keeping the worse one
    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional detail when not healthy
    pub message: Option<String>,
}

/// One pool's activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReport {
    pub name: String,
    pub size: usize,
    /// Workers serving a client (registrar) or playing a game (game)
    pub engaged: usize,
    pub runs_completed: u64,
    pub runs_failed: u64,
}

impl From<&PoolLoad> for PoolReport {
    fn from(load: &PoolLoad) -> Self {
        Self {
            name: load.name.to_string(),
            size: load.stats.size,
            engaged: load.engaged,
            runs_completed: load.stats.runs_completed,
            runs_failed: load.stats.runs_failed,
        }
    }
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Players currently waiting for an opponent
    pub players_waiting: usize,
    /// Names of waiting players in arrival order
    pub waiting_names: Vec<String>,
    /// Registrations since service start
    pub registrations: u64,
    /// Withdrawals since service start
    pub withdrawals: u64,
    /// Pairs formed since service start
    pub pairs_formed: u64,
    /// Worker pools
    pub pools: Vec<PoolReport>,
    /// Seconds since start
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: &AppState) -> Self {
        let pools = app_state.pool_loads().await;
        let queue = app_state.queue().stats();

        let mut checks = vec![Self::check_service_running(app_state).await];
        checks.extend(pools.iter().map(|load| Self::check_pool(load, queue.waiting)));

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        let stats = ServiceStats {
            players_waiting: queue.waiting,
            waiting_names: app_state.queue().waiting_names(),
            registrations: queue.enqueued,
            withdrawals: queue.withdrawn,
            pairs_formed: queue.pairs_formed,
            pools: pools.iter().map(PoolReport::from).collect(),
            uptime_seconds: app_state.uptime().as_secs(),
        };

        debug!("Health check: {}", status);

        HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        }
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: &AppState) -> HealthStatus {
        if app_state.is_running().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Readiness check - running, with both pools up
    pub async fn readiness_check(app_state: &AppState) -> HealthStatus {
        if !app_state.is_running().await {
            return HealthStatus::Unhealthy;
        }

        let waiting = app_state.queue().len();
        app_state
            .pool_loads()
            .await
            .iter()
            .map(|load| Self::check_pool(load, waiting).status)
            .fold(HealthStatus::Healthy, HealthStatus::worst)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
        }
    }

    /// A pool without slots cannot serve anyone. Every registrar engaged
    /// means new connections sit in the listen backlog; every game worker
    /// engaged while a pair waits means players queue behind running games.
    fn check_pool(load: &PoolLoad, waiting: usize) -> ComponentCheck {
        let size = load.stats.size;
        let saturated = load.engaged >= size && (load.name != "game" || waiting >= 2);

        let (status, message) = if size == 0 {
            (HealthStatus::Unhealthy, Some("Pool has no workers".to_string()))
        } else if saturated {
            (
                HealthStatus::Degraded,
                Some(format!("All {} workers engaged", size)),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: format!("{}_pool", load.name),
            status,
            message,
        }
    }
}

impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolStats;

    fn load(name: &'static str, size: usize, engaged: usize) -> PoolLoad {
        PoolLoad {
            name,
            stats: PoolStats {
                size,
                busy: size,
                ..PoolStats::default()
            },
            engaged,
        }
    }

    #[test]
    fn test_pool_checks() {
        assert_eq!(
            HealthCheck::check_pool(&load("game", 4, 1), 0).status,
            HealthStatus::Healthy
        );
        // Every game worker playing with nobody waiting is just a busy server
        assert_eq!(
            HealthCheck::check_pool(&load("game", 4, 4), 1).status,
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthCheck::check_pool(&load("game", 4, 4), 2).status,
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthCheck::check_pool(&load("registrar", 2, 2), 0).status,
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthCheck::check_pool(&load("registrar", 0, 0), 0).status,
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_worst_status() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Unhealthy.worst(HealthStatus::Degraded),
            HealthStatus::Unhealthy
        );
        assert_eq!(HealthStatus::Healthy.as_gauge(), 2);
    }
}
