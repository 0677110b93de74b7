//! Chance-It Client CLI Tool
//!
//! Automated line-protocol client for manually exercising a running server.
//!
//! Usage:
//!   # Start the server first:
//!   cargo run --bin chance-it
//!
//!   # Then play as two clients:
//!   cargo run --bin chance-it-client -- --name ann
//!   cargo run --bin chance-it-client -- --name bob --threshold 12
//!
//!   # Withdraw if nobody shows up within 5 seconds:
//!   cargo run --bin chance-it-client -- --name carl --goodbye-after 5

use anyhow::{Context, Result};
use chance_it::types::{
    CHANCE_IT_PROMPT, GOODBYE_PREFIX, HELLO_PREFIX, LOSER_MESSAGE, TIE_MESSAGE, WINNER_MESSAGE,
};
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(name = "chance-it-client")]
#[command(about = "Play Chance-It against another client with a fixed push-your-luck strategy")]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server game port
    #[arg(short, long, default_value = "1099")]
    port: u16,

    /// Display name sent with HELLO
    #[arg(short, long)]
    name: String,

    /// Keep rolling while the running turn score is below this
    #[arg(short, long, default_value = "15")]
    threshold: u32,

    /// Send GOODBYE if still unpaired after this many seconds
    #[arg(short, long)]
    goodbye_after: Option<u64>,
}

/// Decides each answer from the last status block seen
#[derive(Debug)]
struct ThresholdStrategy {
    threshold: u32,
    running: u32,
}

impl ThresholdStrategy {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            running: 0,
        }
    }

    fn observe(&mut self, line: &str) {
        if let Some(score) = line.strip_prefix("Running Turn Score: ") {
            self.running = score.trim().parse().unwrap_or(0);
        }
    }

    fn answer(&self) -> &'static str {
        if self.running < self.threshold {
            "chance-it"
        } else {
            "n"
        }
    }
}

fn is_terminal(line: &str) -> bool {
    matches!(line, WINNER_MESSAGE | LOSER_MESSAGE | TIE_MESSAGE)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);

    println!("🔌 Connecting to {} as '{}'", addr, cli.name);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(format!("{}{}\n", HELLO_PREFIX, cli.name).as_bytes())
        .await?;

    let goodbye = async {
        match cli.goodbye_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(goodbye);

    let mut strategy = ThresholdStrategy::new(cli.threshold);
    let mut paired = false;
    let mut said_goodbye = false;

    loop {
        tokio::select! {
            _ = &mut goodbye, if !paired && !said_goodbye => {
                println!("👋 Still unpaired, withdrawing");
                writer
                    .write_all(format!("{}{}\n", GOODBYE_PREFIX, cli.name).as_bytes())
                    .await?;
                said_goodbye = true;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("🔚 Server closed the connection");
                    break;
                };
                println!("{}", line);

                if line.starts_with("Opponent: ") {
                    paired = true;
                }
                strategy.observe(&line);

                if line == CHANCE_IT_PROMPT {
                    let answer = strategy.answer();
                    println!("> {}", answer);
                    writer.write_all(format!("{}\n", answer).as_bytes()).await?;
                } else if is_terminal(&line) {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_strategy() {
        let mut strategy = ThresholdStrategy::new(10);
        strategy.observe("Running Turn Score: 7");
        assert_eq!(strategy.answer(), "chance-it");
        strategy.observe("Roll Score: 5");
        strategy.observe("Running Turn Score: 12");
        assert_eq!(strategy.answer(), "n");
        strategy.observe("Running Turn Score: 0");
        assert_eq!(strategy.answer(), "chance-it");
    }

    #[test]
    fn test_terminal_messages() {
        assert!(is_terminal("You Win!"));
        assert!(is_terminal("It's a Draw."));
        assert!(!is_terminal("Opponent: ann"));
    }
}
