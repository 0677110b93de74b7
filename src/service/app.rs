//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the game listener,
//! the registrar and game worker pools, the outcome log, and the background
//! tasks that serve health checks and refresh metrics.

use crate::config::AppConfig;
use crate::game::{GameRules, GameSlot, GameWorker};
use crate::matchmaking::{MatchmakingQueue, Registration};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::net::Acceptor;
use crate::outcome::{CsvOutcomeLog, OutcomeLog};
use crate::pool::{PoolStats, WorkerPool};
use crate::registrar::Registrar;
use crate::service::health::HealthCheck;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// How often pool and queue gauges are refreshed
const METRICS_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Back-off after a failed accept so a persistent error does not spin
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Load of one worker pool, as seen by health checks and metrics
#[derive(Debug, Clone)]
pub struct PoolLoad {
    pub name: &'static str,
    pub stats: PoolStats,
    /// Workers serving a client or playing a game right now
    pub engaged: usize,
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Matchmaking queue shared by registrars and game workers
    queue: Arc<MatchmakingQueue>,

    /// Game listener
    acceptor: Arc<Acceptor>,

    /// Prometheus metrics
    metrics: Arc<MetricsCollector>,

    registrar: Arc<Registrar>,
    game_worker: Arc<GameWorker>,

    /// Running worker pools
    pools: Mutex<Vec<WorkerPool>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Stops the health server, when one was started
    health_shutdown: Mutex<Option<broadcast::Sender<()>>>,

    /// Service status
    is_running: RwLock<bool>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application, logging outcomes to the configured file
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let outcome_log = CsvOutcomeLog::open(&config.outcome_log.path)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open outcome log: {}", e),
            })?;

        Self::with_outcome_log(config, Arc::new(outcome_log)).await
    }

    /// Initialize the application with an explicit outcome log
    pub async fn with_outcome_log(
        config: AppConfig,
        outcome_log: Arc<dyn OutcomeLog>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing chance-it game server");
        info!(
            "Configuration: service={}, listen={}, rounds={}, registrars={}, game workers={}",
            config.service.name,
            config.listen_addr(),
            config.game.rounds,
            config.registrar.workers,
            config.game.workers
        );

        let metrics = Arc::new(
            MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })?,
        );

        let acceptor = Acceptor::bind(&config.listen_addr())
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("{:#}", e),
            })?;

        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = Arc::new(Registrar::new(
            queue.clone(),
            metrics.clone(),
            config.withdrawal_poll(),
        ));
        let game_worker = Arc::new(GameWorker::new(
            queue.clone(),
            outcome_log,
            metrics.clone(),
            GameRules::from_config(&config),
            config.handoff_timeout(),
        ));

        Ok(Self {
            config,
            queue,
            acceptor: Arc::new(acceptor),
            metrics,
            registrar,
            game_worker,
            pools: Mutex::new(Vec::new()),
            background_tasks: Mutex::new(Vec::new()),
            health_shutdown: Mutex::new(None),
            is_running: RwLock::new(false),
            started_at: Instant::now(),
        })
    }

    /// Start the worker pools and background services
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting chance-it game server");

        let mut running = self.is_running.write().await;
        if *running {
            return Err(ServiceError::BackgroundTask {
                message: "Service is already running".to_string(),
            });
        }
        *running = true;
        drop(running);

        self.start_health_server().await;
        self.start_pools().await;
        self.start_background_tasks().await;

        info!("✅ Chance-it server accepting players on {}", self.local_addr());
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of chance-it server");

        *self.is_running.write().await = false;

        // Stop accepting and cancel in-flight registrations and games
        let mut pools = self.pools.lock().await;
        for pool in pools.iter_mut() {
            pool.shutdown().await;
        }
        pools.clear();
        drop(pools);

        if let Some(shutdown_tx) = self.health_shutdown.lock().await.take() {
            if shutdown_tx.send(()).is_err() {
                debug!("Health server already stopped");
            }
        }

        self.stop_background_tasks().await;

        let stats = self.queue.stats();
        info!(
            "Final statistics: registrations={}, withdrawals={}, pairs={}, still waiting={}",
            stats.enqueued, stats.withdrawn, stats.pairs_formed, stats.waiting
        );
        info!("✅ Chance-it server shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Address the game listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Time since the state was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Current load of every running pool
    pub async fn pool_loads(&self) -> Vec<PoolLoad> {
        self.pools
            .lock()
            .await
            .iter()
            .map(|pool| PoolLoad {
                name: pool.name(),
                stats: pool.stats(),
                engaged: match pool.name() {
                    "registrar" => self.registrar.engaged(),
                    _ => self.game_worker.engaged(),
                },
            })
            .collect()
    }

    async fn start_health_server(self: &Arc<Self>) {
        let port = self.config.service.metrics_port;
        if port == 0 {
            info!("Health and metrics endpoints disabled");
            return;
        }

        let health_config = HealthServerConfig {
            port,
            host: self.config.service.host.clone(),
        };
        let server =
            HealthServer::new(health_config, self.metrics.clone()).with_app_state(self.clone());
        *self.health_shutdown.lock().await = Some(server.shutdown_handle());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {}", e);
            }
        });
        self.background_tasks.lock().await.push(handle);

        info!("✅ Health endpoints starting on port {}", port);
    }

    async fn start_pools(&self) {
        let acceptor = self.acceptor.clone();
        let registrar = self.registrar.clone();
        let registrar_pool = WorkerPool::spawn(
            "registrar",
            self.config.registrar.workers,
            move |slot, mut registration: Registration| {
                let acceptor = acceptor.clone();
                let registrar = registrar.clone();
                async move {
                    match acceptor.accept().await {
                        Ok(connection) => {
                            let outcome = registrar.serve(&mut registration, connection).await;
                            debug!("Registrar {} finished: {:?}", slot, outcome);
                        }
                        Err(e) => {
                            warn!("Registrar {} failed to accept: {}", slot, e);
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                    }
                    registration
                }
            },
        );

        let game_worker = self.game_worker.clone();
        let game_pool = WorkerPool::spawn(
            "game",
            self.config.game.workers,
            move |_slot, mut game_slot: GameSlot| {
                let game_worker = game_worker.clone();
                async move {
                    game_worker.run_once(&mut game_slot).await;
                    game_slot
                }
            },
        );

        let mut pools = self.pools.lock().await;
        pools.push(registrar_pool);
        pools.push(game_pool);
    }

    async fn start_background_tasks(self: &Arc<Self>) {
        info!(
            "Starting metrics update task ({}s interval)...",
            METRICS_UPDATE_INTERVAL.as_secs()
        );

        let app = self.clone();
        let metrics_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(METRICS_UPDATE_INTERVAL);
            debug!("Metrics update task started");

            while app.is_running().await {
                interval.tick().await;
                app.refresh_metrics().await;
            }

            debug!("Metrics update task stopped");
        });

        self.background_tasks.lock().await.push(metrics_task);
    }

    async fn refresh_metrics(&self) {
        self.metrics.update_uptime(self.uptime());
        self.metrics.set_players_waiting(self.queue.len());
        for load in self.pool_loads().await {
            self.metrics
                .update_pool_load(load.name, &load.stats, load.engaged);
        }

        let health = HealthCheck::check(self).await;
        self.metrics.update_health_status(health.status.as_gauge());
        debug!(
            "Metrics refreshed - waiting: {}, status: {}",
            health.stats.players_waiting, health.status
        );
    }

    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        info!("Stopping {} background tasks...", tasks.len());
        for task in tasks.drain(..) {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Background task ended abnormally: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::MemoryOutcomeLog;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.service.host = "127.0.0.1".to_string();
        config.service.port = 0;
        config.service.metrics_port = 0;
        config.registrar.workers = 2;
        config.game.workers = 3;
        config
    }

    async fn app_state() -> Arc<AppState> {
        Arc::new(
            AppState::with_outcome_log(test_config(), Arc::new(MemoryOutcomeLog::new()))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let app = app_state().await;
        assert!(!app.is_running().await);
        assert!(app.pool_loads().await.is_empty());
        assert_ne!(app.local_addr().port(), 0);

        app.start().await.unwrap();
        assert!(app.is_running().await);

        let loads = app.pool_loads().await;
        let sizes: Vec<_> = loads.iter().map(|load| (load.name, load.stats.size)).collect();
        assert_eq!(sizes, vec![("registrar", 2), ("game", 3)]);
        assert!(loads.iter().all(|load| load.engaged == 0));

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
        assert!(app.pool_loads().await.is_empty());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let app = app_state().await;
        app.start().await.unwrap();
        assert!(app.start().await.is_err());
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_an_initialization_error() {
        let first = app_state().await;
        let mut config = test_config();
        config.service.port = first.local_addr().port();

        let result = AppState::with_outcome_log(config, Arc::new(MemoryOutcomeLog::new())).await;
        assert!(matches!(result, Err(ServiceError::Initialization { .. })));
    }

    #[tokio::test]
    async fn test_refresh_metrics_reports_health() {
        let app = app_state().await;
        app.start().await.unwrap();
        app.refresh_metrics().await;

        let text = app.metrics().encode_text().unwrap();
        assert!(text.contains("chance_it_health_status 2"));
        assert!(text.contains("chance_it_workers_total{pool=\"game\"} 3"));

        app.shutdown().await.unwrap();
    }
}
