//! Test fixtures for driving a real server over TCP loopback

#![allow(dead_code)]

use chance_it::config::AppConfig;
use chance_it::outcome::{MemoryOutcomeLog, OutcomeLog};
use chance_it::service::AppState;
use chance_it::types::{CHANCE_IT_PROMPT, HELLO_ACK, LOSER_MESSAGE, TIE_MESSAGE, WINNER_MESSAGE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Generous bound on any single read in these tests
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Fast configuration: ephemeral port, no HTTP server, no artificial delays
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.service.host = "127.0.0.1".to_string();
    config.service.port = 0;
    config.service.metrics_port = 0;
    config.registrar.workers = 4;
    config.registrar.withdrawal_poll_ms = 100;
    config.game.workers = 2;
    config.game.rounds = 1;
    config.game.player_input_timeout_seconds = 2;
    config.game.handoff_timeout_ms = 50;
    config.game.opponent_notify_delay_ms = 0;
    config.game.roll_delay_ms = 0;
    config
}

/// A running server with an in-memory outcome log
pub struct TestServer {
    pub app: Arc<AppState>,
    pub log: Arc<MemoryOutcomeLog>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(config: AppConfig) -> Self {
        let log = Arc::new(MemoryOutcomeLog::new());
        let app = Arc::new(
            AppState::with_outcome_log(config, log.clone() as Arc<dyn OutcomeLog>)
                .await
                .expect("server should initialize"),
        );
        app.start().await.expect("server should start");
        Self { app, log }
    }

    pub fn addr(&self) -> SocketAddr {
        self.app.local_addr()
    }

    /// Wait until the outcome log holds `count` records
    pub async fn wait_for_records(&self, count: usize) {
        tokio::time::timeout(READ_TIMEOUT, async {
            while self.log.records().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("games did not finish in time");
    }

    /// Wait until exactly `count` players are queued
    pub async fn wait_for_waiting(&self, count: usize) {
        tokio::time::timeout(READ_TIMEOUT, async {
            while self.app.queue().len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue never reached the expected length");
    }

    /// Wait until `count` registrations have reached the queue since start
    pub async fn wait_for_registrations(&self, count: u64) {
        tokio::time::timeout(READ_TIMEOUT, async {
            while self.app.queue().stats().enqueued < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registrations never reached the queue");
    }

    pub async fn stop(self) {
        self.app.shutdown().await.expect("server should shut down");
    }
}

/// A line-protocol client
pub struct TestPlayer {
    pub name: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestPlayer {
    pub async fn connect(addr: SocketAddr, name: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        Self {
            name: name.to_string(),
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Connect and complete the HELLO handshake
    pub async fn register(addr: SocketAddr, name: &str) -> Self {
        let mut player = Self::connect(addr, name).await;
        player.send(&format!("HELLO:{}", name)).await;
        assert_eq!(player.recv().await.as_deref(), Some(HELLO_ACK));
        player
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("write");
    }

    /// Next line, or `None` once the server closed the connection
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for the server")
            .unwrap_or(None)
    }

    /// Read until a line satisfies `pred`
    pub async fn recv_until(&mut self, pred: impl Fn(&str) -> bool) -> Option<String> {
        while let Some(line) = self.recv().await {
            if pred(&line) {
                return Some(line);
            }
        }
        None
    }

    /// Read everything until the server closes the connection
    pub async fn drain(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(line) = self.recv().await {
            seen.push(line);
        }
        seen
    }

    /// Answer every prompt with `answer` until the game ends; returns everything received
    pub async fn play_answering(mut self, answer: &str) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(line) = self.recv().await {
            if line == CHANCE_IT_PROMPT {
                self.send(answer).await;
            }
            seen.push(line);
        }
        seen
    }
}

pub fn is_terminal(line: &str) -> bool {
    matches!(line, WINNER_MESSAGE | LOSER_MESSAGE | TIE_MESSAGE)
}
