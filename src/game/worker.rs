//! Game worker: turns claimed pairs into played games
//!
//! Each pooled game worker blocks until the queue holds two registrations,
//! claims them in arrival order, collects both connections from their
//! registrars and plays the game to completion. If a connection cannot be
//! collected the game is forfeited by that seat before it starts.

use crate::game::dice::{random_dice, DieFactory};
use crate::game::session::{ActivePlayer, GameRules, GameSession};
use crate::matchmaking::{ClaimedTicket, HandOff, MatchmakingQueue};
use crate::metrics::MetricsCollector;
use crate::outcome::OutcomeLog;
use crate::pool::{Engagement, Recyclable};
use crate::types::{GameId, OutcomeRecord, Reason, Standing, WINNER_MESSAGE};
use crate::utils::{current_timestamp, generate_game_id};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-slot state of a pooled game worker
#[derive(Debug, Default)]
pub struct GameSlot {
    /// Game currently being played in this slot
    pub current_game: Option<GameId>,
    /// Games this slot has finished since start
    pub games_played: u64,
}

impl Recyclable for GameSlot {
    fn reset(&mut self) {
        self.current_game = None;
    }
}

pub struct GameWorker {
    queue: Arc<MatchmakingQueue>,
    outcome_log: Arc<dyn OutcomeLog>,
    metrics: Arc<MetricsCollector>,
    rules: GameRules,
    handoff_timeout: Duration,
    dice: DieFactory,
    engagement: Engagement,
}

impl GameWorker {
    pub fn new(
        queue: Arc<MatchmakingQueue>,
        outcome_log: Arc<dyn OutcomeLog>,
        metrics: Arc<MetricsCollector>,
        rules: GameRules,
        handoff_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            outcome_log,
            metrics,
            rules,
            handoff_timeout,
            dice: random_dice(),
            engagement: Engagement::default(),
        }
    }

    /// Replace the dice every new player receives
    pub fn with_dice(mut self, dice: DieFactory) -> Self {
        self.dice = dice;
        self
    }

    /// Workers currently playing a game
    pub fn engaged(&self) -> usize {
        self.engagement.current()
    }

    /// Wait for a pair, then play one game with it
    pub async fn run_once(&self, slot: &mut GameSlot) -> OutcomeRecord {
        let pair = self.queue.claim_pair().await;
        let _engaged = self.engagement.enter();
        self.metrics.record_pair_formed(self.queue.len());

        let game_id = generate_game_id();
        slot.current_game = Some(game_id);

        let record = self.play_pair(game_id, pair).await;
        slot.games_played += 1;
        record
    }

    async fn play_pair(&self, game_id: GameId, pair: [ClaimedTicket; 2]) -> OutcomeRecord {
        let names = [pair[0].name().to_string(), pair[1].name().to_string()];
        debug!("Game {}: collecting '{}' and '{}'", game_id, names[0], names[1]);

        let [first, second] = pair;
        let (first, second) = tokio::join!(
            first.collect(self.handoff_timeout),
            second.collect(self.handoff_timeout)
        );

        match (first, second) {
            (Ok(first), Ok(second)) => {
                let players = [
                    ActivePlayer::from_handoff(first, (self.dice)()),
                    ActivePlayer::from_handoff(second, (self.dice)()),
                ];
                let summary = GameSession::new(game_id, players, self.rules.clone())
                    .play(self.outcome_log.as_ref())
                    .await;
                self.metrics.record_game_finished(
                    summary.record.reason,
                    summary.turns_played,
                    summary.busts,
                    summary.duration,
                );
                summary.record
            }
            (first, second) => {
                let collected = [first, second].map(|result| {
                    result
                        .map_err(|e| warn!("Game {}: {}", game_id, e))
                        .ok()
                });
                self.abandon(game_id, names, collected).await
            }
        }
    }

    /// A seat whose connection never arrived forfeits before the first roll
    async fn abandon(
        &self,
        game_id: GameId,
        names: [String; 2],
        collected: [Option<HandOff>; 2],
    ) -> OutcomeRecord {
        self.metrics.record_handoff_failure();

        let loser = if collected[0].is_none() { 0 } else { 1 };
        let winner = 1 - loser;
        let record = OutcomeRecord {
            game_id,
            winner: Standing {
                name: names[winner].clone(),
                score: 0,
            },
            loser: Standing {
                name: names[loser].clone(),
                score: 0,
            },
            reason: Reason::Disconnect,
            finished_at: current_timestamp(),
        };

        if let Err(e) = self.outcome_log.append(&record).await {
            error!("Failed to record outcome of game {}: {}", game_id, e);
        }

        for handoff in collected.into_iter().flatten() {
            let mut connection = handoff.connection;
            if connection.send_line(WINNER_MESSAGE).await.is_err() {
                debug!("Game {}: '{}' did not receive the final message", game_id, handoff.name);
            }
            connection.close().await;
        }

        self.metrics
            .record_game_finished(record.reason, 0, 0, Duration::ZERO);
        info!("🏁 Game {} abandoned: {}", game_id, record.to_log_line());
        record
    }
}
