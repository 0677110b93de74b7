//! Metrics collection using Prometheus
//!
//! Counters and gauges for every stage a client passes through: registration,
//! matchmaking, hand-off, gameplay, and the two worker pools.

use crate::pool::PoolStats;
use crate::types::Reason;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the game server
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Registration and queue metrics
    matchmaking_metrics: MatchmakingMetrics,

    /// Gameplay metrics
    game_metrics: GameMetrics,

    /// Worker pool metrics
    pool_metrics: PoolMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Connections accepted by registrar workers
    pub connections_accepted_total: IntCounter,
}

/// Registration and queue metrics
#[derive(Clone)]
pub struct MatchmakingMetrics {
    /// Players that completed HELLO and joined the queue
    pub registrations_total: IntCounter,

    /// Players that left the queue with GOODBYE or by disconnecting
    pub withdrawals_total: IntCounter,

    /// Players currently waiting for an opponent
    pub players_waiting: IntGauge,

    /// Pairs taken off the queue by game workers
    pub pairs_formed_total: IntCounter,

    /// Claimed registrations whose connection never reached the game worker
    pub handoff_failures_total: IntCounter,
}

/// Gameplay metrics
#[derive(Clone)]
pub struct GameMetrics {
    /// Finished games by reason code
    pub games_completed_total: IntCounterVec,

    /// Turns played to completion
    pub turns_total: IntCounter,

    /// Turns lost to the bust rule
    pub busts_total: IntCounter,

    /// Wall-clock game length
    pub game_duration_seconds: Histogram,
}

/// Worker pool metrics
#[derive(Clone)]
pub struct PoolMetrics {
    /// Workers currently serving a client or a game
    pub workers_busy: IntGaugeVec,

    /// Configured pool size
    pub workers_total: IntGaugeVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let matchmaking_metrics = MatchmakingMetrics::new(&registry)?;
        let game_metrics = GameMetrics::new(&registry)?;
        let pool_metrics = PoolMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            matchmaking_metrics,
            game_metrics,
            pool_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn matchmaking(&self) -> &MatchmakingMetrics {
        &self.matchmaking_metrics
    }

    pub fn game(&self) -> &GameMetrics {
        &self.game_metrics
    }

    pub fn pool(&self) -> &PoolMetrics {
        &self.pool_metrics
    }

    pub fn record_connection_accepted(&self) {
        self.service_metrics.connections_accepted_total.inc();
    }

    /// Record a player joining the queue
    pub fn record_registration(&self, waiting: usize) {
        self.matchmaking_metrics.registrations_total.inc();
        self.set_players_waiting(waiting);
    }

    /// Record a player leaving the queue before being paired
    pub fn record_withdrawal(&self, waiting: usize) {
        self.matchmaking_metrics.withdrawals_total.inc();
        self.set_players_waiting(waiting);
    }

    pub fn set_players_waiting(&self, waiting: usize) {
        self.matchmaking_metrics
            .players_waiting
            .set(waiting as i64);
    }

    /// Record a game worker claiming a pair
    pub fn record_pair_formed(&self, waiting: usize) {
        self.matchmaking_metrics.pairs_formed_total.inc();
        self.set_players_waiting(waiting);
    }

    pub fn record_handoff_failure(&self) {
        self.matchmaking_metrics.handoff_failures_total.inc();
    }

    /// Record a finished game
    pub fn record_game_finished(&self, reason: Reason, turns: u32, busts: u32, duration: Duration) {
        self.game_metrics
            .games_completed_total
            .with_label_values(&[reason.as_str()])
            .inc();
        self.game_metrics.turns_total.inc_by(u64::from(turns));
        self.game_metrics.busts_total.inc_by(u64::from(busts));
        self.game_metrics
            .game_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Copy a pool's size and the number of workers engaged with a client
    pub fn update_pool_load(&self, pool: &str, stats: &PoolStats, engaged: usize) {
        self.pool_metrics
            .workers_busy
            .with_label_values(&[pool])
            .set(engaged as i64);
        self.pool_metrics
            .workers_total
            .with_label_values(&[pool])
            .set(stats.size as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(i64::from(status));
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Render the registry in Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        TextEncoder::new()
            .encode_to_string(&metric_families)
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("chance_it_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "chance_it_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let connections_accepted_total = IntCounter::new(
            "chance_it_connections_accepted_total",
            "Client connections accepted",
        )?;
        registry.register(Box::new(connections_accepted_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            connections_accepted_total,
        })
    }
}

impl MatchmakingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let registrations_total = IntCounter::new(
            "chance_it_registrations_total",
            "Players that registered with HELLO",
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let withdrawals_total = IntCounter::new(
            "chance_it_withdrawals_total",
            "Players that left the queue before pairing",
        )?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let players_waiting = IntGauge::new(
            "chance_it_players_waiting",
            "Players currently waiting for an opponent",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let pairs_formed_total =
            IntCounter::new("chance_it_pairs_formed_total", "Pairs formed by game workers")?;
        registry.register(Box::new(pairs_formed_total.clone()))?;

        let handoff_failures_total = IntCounter::new(
            "chance_it_handoff_failures_total",
            "Claimed registrations that could not be handed off",
        )?;
        registry.register(Box::new(handoff_failures_total.clone()))?;

        Ok(Self {
            registrations_total,
            withdrawals_total,
            players_waiting,
            pairs_formed_total,
            handoff_failures_total,
        })
    }
}

impl GameMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let games_completed_total = IntCounterVec::new(
            Opts::new("chance_it_games_completed_total", "Games finished"),
            &["reason"],
        )?;
        registry.register(Box::new(games_completed_total.clone()))?;

        let turns_total = IntCounter::new("chance_it_turns_total", "Turns played to completion")?;
        registry.register(Box::new(turns_total.clone()))?;

        let busts_total = IntCounter::new("chance_it_busts_total", "Turns lost to a bust")?;
        registry.register(Box::new(busts_total.clone()))?;

        let game_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("chance_it_game_duration_seconds", "Game duration")
                .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;
        registry.register(Box::new(game_duration_seconds.clone()))?;

        Ok(Self {
            games_completed_total,
            turns_total,
            busts_total,
            game_duration_seconds,
        })
    }
}

impl PoolMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let workers_busy = IntGaugeVec::new(
            Opts::new("chance_it_workers_busy", "Workers currently serving a client or a game"),
            &["pool"],
        )?;
        registry.register(Box::new(workers_busy.clone()))?;

        let workers_total = IntGaugeVec::new(
            Opts::new("chance_it_workers_total", "Configured workers per pool"),
            &["pool"],
        )?;
        registry.register(Box::new(workers_total.clone()))?;

        Ok(Self {
            workers_busy,
            workers_total,
        })
    }
}
