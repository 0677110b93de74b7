//! Main application configuration
//!
//! This module defines the primary configuration structures for the chance-it
//! server, including environment variable and TOML file loading and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub registrar: RegistrarSettings,
    pub game: GameSettings,
    pub outcome_log: OutcomeLogSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host the game listener binds to
    pub host: String,
    /// Game listener port (0 picks an ephemeral port)
    pub port: u16,
    /// Port for health and metrics endpoints (0 disables the HTTP server)
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Registrar pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarSettings {
    /// Number of pooled registrar workers
    pub workers: usize,
    /// Read poll interval while waiting for GOODBYE, in milliseconds
    pub withdrawal_poll_ms: u64,
}

/// Game worker pool and rule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Number of pooled game workers
    pub workers: usize,
    /// Rounds per game; every round gives each player one turn
    pub rounds: u32,
    /// Seconds a player has to answer a prompt before forfeiting
    pub player_input_timeout_seconds: u64,
    /// Upper bound on collecting a claimed connection from its registrar, in milliseconds
    pub handoff_timeout_ms: u64,
    /// Pause before announcing opponents, in milliseconds
    pub opponent_notify_delay_ms: u64,
    /// Simulated roll time after each command, in milliseconds
    pub roll_delay_ms: u64,
}

/// Outcome log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeLogSettings {
    /// Destination file for completed game records
    pub path: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "chance-it".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 1099,
            metrics_port: 9090,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for RegistrarSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            withdrawal_poll_ms: 1000, // 1 second
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            rounds: 2,
            player_input_timeout_seconds: 10,
            handoff_timeout_ms: 250,
            opponent_notify_delay_ms: 1000,
            roll_delay_ms: 1000,
        }
    }
}

impl Default for OutcomeLogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./gameLog.csv"),
        }
    }
}

/// Parse an environment variable into `target` if it is set
fn override_from_env<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = env::var(key) {
        *target = value
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value))?;
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still take precedence
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HOST") {
            self.service.host = host;
        }
        override_from_env("PORT", &mut self.service.port)?;
        override_from_env("METRICS_PORT", &mut self.service.metrics_port)?;
        override_from_env(
            "SHUTDOWN_TIMEOUT_SECONDS",
            &mut self.service.shutdown_timeout_seconds,
        )?;

        // Registrar settings
        override_from_env("REGISTRAR_WORKERS", &mut self.registrar.workers)?;
        override_from_env("WITHDRAWAL_POLL_MS", &mut self.registrar.withdrawal_poll_ms)?;

        // Game settings
        override_from_env("GAME_WORKERS", &mut self.game.workers)?;
        override_from_env("ROUNDS", &mut self.game.rounds)?;
        override_from_env(
            "PLAYER_INPUT_TIMEOUT_SECONDS",
            &mut self.game.player_input_timeout_seconds,
        )?;
        override_from_env("HANDOFF_TIMEOUT_MS", &mut self.game.handoff_timeout_ms)?;
        override_from_env(
            "OPPONENT_NOTIFY_DELAY_MS",
            &mut self.game.opponent_notify_delay_ms,
        )?;
        override_from_env("ROLL_DELAY_MS", &mut self.game.roll_delay_ms)?;

        // Outcome log
        if let Ok(path) = env::var("GAME_LOG") {
            self.outcome_log.path = PathBuf::from(path);
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the registrar's withdrawal poll interval as Duration
    pub fn withdrawal_poll(&self) -> Duration {
        Duration::from_millis(self.registrar.withdrawal_poll_ms)
    }

    /// Get the per-prompt player input timeout as Duration
    pub fn player_input_timeout(&self) -> Duration {
        Duration::from_secs(self.game.player_input_timeout_seconds)
    }

    /// Get the hand-off timeout as Duration
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.game.handoff_timeout_ms)
    }

    /// Address the game listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.host.is_empty() {
        return Err(anyhow!("Host cannot be empty"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate pools
    if config.registrar.workers == 0 {
        return Err(anyhow!("Registrar pool needs at least one worker"));
    }
    if config.game.workers == 0 {
        return Err(anyhow!("Game worker pool needs at least one worker"));
    }

    // Validate game rules and timeouts
    if config.game.rounds == 0 {
        return Err(anyhow!("Rounds per game must be greater than 0"));
    }
    if config.game.player_input_timeout_seconds == 0 {
        return Err(anyhow!("Player input timeout must be greater than 0"));
    }
    if config.game.handoff_timeout_ms == 0 {
        return Err(anyhow!("Hand-off timeout must be greater than 0"));
    }
    if config.game.handoff_timeout_ms >= config.registrar.withdrawal_poll_ms {
        return Err(anyhow!(
            "Hand-off timeout ({}ms) must be shorter than the withdrawal poll ({}ms)",
            config.game.handoff_timeout_ms,
            config.registrar.withdrawal_poll_ms
        ));
    }

    if config.outcome_log.path.as_os_str().is_empty() {
        return Err(anyhow!("Outcome log path cannot be empty"));
    }

    Ok(())
}
