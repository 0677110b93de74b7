//! A running game between two paired players
//!
//! The session owns both connections for its whole lifetime. Every exit path,
//! fair finish or forfeit, goes through [`GameSession::play`]'s conclusion:
//! exactly one outcome record, one terminal message per player, both sockets
//! closed.

use crate::config::AppConfig;
use crate::game::dice::DieSource;
use crate::game::turn::{status_block, Command, RollResult, TurnState};
use crate::matchmaking::HandOff;
use crate::net::{Connection, ReadOutcome};
use crate::outcome::OutcomeLog;
use crate::types::{
    GameId, OutcomeRecord, Reason, RegistrationId, Standing, CHANCE_IT_PROMPT, LOSER_MESSAGE,
    TIE_MESSAGE, WINNER_MESSAGE,
};
use crate::utils::{current_timestamp, generate_registration_id};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timing and length of a game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    /// Rounds per game; every round gives each player one turn
    pub rounds: u32,
    /// Bound on each read while a player is deciding
    pub input_timeout: Duration,
    /// Pause before players are told who they are facing
    pub opponent_notify_delay: Duration,
    /// Simulated roll time after every command
    pub roll_delay: Duration,
}

impl GameRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            rounds: config.game.rounds,
            input_timeout: config.player_input_timeout(),
            opponent_notify_delay: Duration::from_millis(config.game.opponent_notify_delay_ms),
            roll_delay: Duration::from_millis(config.game.roll_delay_ms),
        }
    }

    /// Turns in a game that is not forfeited
    pub fn total_turns(&self) -> u32 {
        self.rounds * 2
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One half of a running game
pub struct ActivePlayer {
    pub registration_id: RegistrationId,
    pub name: String,
    connection: Connection,
    die: Box<dyn DieSource>,
    captured_line: Option<String>,
}

impl ActivePlayer {
    pub fn new(name: impl Into<String>, connection: Connection, die: Box<dyn DieSource>) -> Self {
        Self {
            registration_id: generate_registration_id(),
            name: name.into(),
            connection,
            die,
            captured_line: None,
        }
    }

    /// Take over a claimed registration's connection
    pub fn from_handoff(handoff: HandOff, die: Box<dyn DieSource>) -> Self {
        Self {
            registration_id: handoff.registration_id,
            name: handoff.name,
            connection: handoff.connection,
            die,
            captured_line: handoff.captured_line,
        }
    }

    fn roll(&mut self) -> u8 {
        self.die.roll()
    }

    async fn send(&mut self, line: &str) -> Result<(), Reason> {
        self.connection.send_line(line).await.map_err(|e| {
            debug!("Write to '{}' failed: {}", self.name, e);
            Reason::Disconnect
        })
    }

    /// Next command line. A line the registrar read after the claim was sent
    /// before anything still buffered on the socket, so it is consumed first.
    async fn next_line(&mut self, limit: Duration) -> Result<String, Reason> {
        if let Some(line) = self.captured_line.take() {
            debug!("Using line captured during hand-off for '{}'", self.name);
            return Ok(line);
        }

        match self.connection.read_line_within(limit).await {
            ReadOutcome::Line(line) => Ok(line),
            ReadOutcome::TimedOut => Err(Reason::Timeout),
            ReadOutcome::Closed => Err(Reason::Disconnect),
        }
    }

    async fn close(self) {
        self.connection.close().await;
    }
}

/// Score slots seen from the turn-taker: slot 0 is "mine", slot 1 "theirs"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreSlots([u32; 2]);

impl ScoreSlots {
    pub fn mine(&self) -> u32 {
        self.0[0]
    }

    pub fn theirs(&self) -> u32 {
        self.0[1]
    }

    /// Add a finished turn's total to the turn-taker's slot
    pub fn bank(&mut self, points: u32) {
        self.0[0] += points;
    }

    /// Hand the perspective to the other player
    pub fn swap(&mut self) {
        self.0.swap(0, 1);
    }
}

/// A game abandoned by one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forfeit {
    /// Index of the forfeiting player
    pub loser: usize,
    pub reason: Reason,
}

/// What a finished session reports back to its worker
#[derive(Debug, Clone)]
pub struct GameSummary {
    pub record: OutcomeRecord,
    pub turns_played: u32,
    pub busts: u32,
    pub duration: Duration,
}

pub struct GameSession {
    id: GameId,
    players: [ActivePlayer; 2],
    current: usize,
    scores: ScoreSlots,
    rules: GameRules,
    turns_played: u32,
    busts: u32,
}

impl GameSession {
    pub fn new(id: GameId, players: [ActivePlayer; 2], rules: GameRules) -> Self {
        Self {
            id,
            players,
            current: 0,
            scores: ScoreSlots::default(),
            rules,
            turns_played: 0,
            busts: 0,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    /// Play to the end, record the outcome, notify both players and close both connections
    pub async fn play(mut self, log: &dyn OutcomeLog) -> GameSummary {
        let started = Instant::now();
        info!(
            "🎲 Game {} started: '{}' vs '{}'",
            self.id, self.players[0].name, self.players[1].name
        );

        let result = self.run().await;
        let (winner, loser, reason) = self.decide(result);
        let record = OutcomeRecord {
            game_id: self.id,
            winner: self.standing(winner),
            loser: self.standing(loser),
            reason,
            finished_at: current_timestamp(),
        };

        if let Err(e) = log.append(&record).await {
            error!("Failed to record outcome of game {}: {}", self.id, e);
        }

        self.announce(winner, loser, reason).await;

        info!(
            "🏁 Game {} finished: {} ({} turns, {} busts)",
            self.id,
            record.to_log_line(),
            self.turns_played,
            self.busts
        );

        let summary = GameSummary {
            record,
            turns_played: self.turns_played,
            busts: self.busts,
            duration: started.elapsed(),
        };

        let [first, second] = self.players;
        tokio::join!(first.close(), second.close());
        summary
    }

    async fn run(&mut self) -> Result<(), Forfeit> {
        self.introduce().await?;
        self.decide_order().await?;

        for round in 1..=self.rules.rounds {
            for _ in 0..2 {
                let banked = self.take_turn(round).await?;
                self.scores.bank(banked);
                self.turns_played += 1;
                debug!(
                    "Game {}: '{}' banked {} (total {})",
                    self.id,
                    self.players[self.current].name,
                    banked,
                    self.scores.mine()
                );
                self.current = 1 - self.current;
                self.scores.swap();
            }
        }
        Ok(())
    }

    async fn introduce(&mut self) -> Result<(), Forfeit> {
        if !self.rules.opponent_notify_delay.is_zero() {
            tokio::time::sleep(self.rules.opponent_notify_delay).await;
        }

        for seat in 0..2 {
            let message = format!("Opponent: {}", self.players[1 - seat].name);
            self.players[seat]
                .send(&message)
                .await
                .map_err(|reason| Forfeit { loser: seat, reason })?;
        }
        Ok(())
    }

    /// Single-die roll-off; ties re-roll until someone is strictly higher
    async fn decide_order(&mut self) -> Result<(), Forfeit> {
        let (first, rolls) = loop {
            let rolls = [self.players[0].roll(), self.players[1].roll()];
            if rolls[0] != rolls[1] {
                break (if rolls[0] > rolls[1] { 0 } else { 1 }, rolls);
            }
            debug!("Game {}: order roll tied at {}, rolling again", self.id, rolls[0]);
        };
        self.current = first;

        let first_name = self.players[first].name.clone();
        for seat in 0..2 {
            let outcome = if seat == first {
                "You go first.".to_string()
            } else {
                format!("{} goes first.", first_name)
            };
            let message = format!(
                "Your roll was: {}. Opponent roll was: {}. {}",
                rolls[seat],
                rolls[1 - seat],
                outcome
            );
            self.players[seat]
                .send(&message)
                .await
                .map_err(|reason| Forfeit { loser: seat, reason })?;
        }

        info!("Game {}: '{}' goes first", self.id, first_name);
        Ok(())
    }

    /// One turn for the current player; returns the points to bank
    async fn take_turn(&mut self, turn_number: u32) -> Result<u32, Forfeit> {
        let seat = self.current;
        let lose = move |reason| Forfeit { loser: seat, reason };
        let (mine, theirs) = (self.scores.mine(), self.scores.theirs());
        let input_timeout = self.rules.input_timeout;
        let roll_delay = self.rules.roll_delay;
        let player = &mut self.players[seat];

        let (die1, die2) = (player.roll(), player.roll());
        let mut turn = TurnState::start(die1, die2);
        player
            .send(&status_block(turn_number, &turn, mine, theirs))
            .await
            .map_err(lose)?;

        loop {
            player.send(CHANCE_IT_PROMPT).await.map_err(lose)?;
            let line = player.next_line(input_timeout).await.map_err(lose)?;

            if !roll_delay.is_zero() {
                tokio::time::sleep(roll_delay).await;
            }

            match Command::parse(&line) {
                Command::ChanceIt => {
                    let (die1, die2) = (player.roll(), player.roll());
                    let result = turn.reroll(die1, die2);
                    player
                        .send(&status_block(turn_number, &turn, mine, theirs))
                        .await
                        .map_err(lose)?;

                    if result == RollResult::Bust {
                        self.busts += 1;
                        info!(
                            "Game {}: '{}' busted on {} and loses the turn",
                            self.id,
                            player.name,
                            turn.first_sum()
                        );
                        return Ok(0);
                    }
                }
                Command::Hold => return Ok(turn.accumulated()),
                Command::Stop => return Err(lose(Reason::Stop)),
                Command::Unrecognized => {
                    debug!("Game {}: '{}' sent {:?}, prompting again", self.id, player.name, line);
                }
            }
        }
    }

    /// Banked score of the player in `seat`
    fn score_of(&self, seat: usize) -> u32 {
        if seat == self.current {
            self.scores.mine()
        } else {
            self.scores.theirs()
        }
    }

    fn standing(&self, seat: usize) -> Standing {
        Standing {
            name: self.players[seat].name.clone(),
            score: self.score_of(seat),
        }
    }

    /// Seats of the recorded winner and loser plus the reason code.
    /// A draw records the player who moved last in the winner slot.
    fn decide(&self, result: Result<(), Forfeit>) -> (usize, usize, Reason) {
        match result {
            Err(Forfeit { loser, reason }) => {
                warn!(
                    "Game {}: '{}' forfeits ({})",
                    self.id, self.players[loser].name, reason
                );
                (1 - loser, loser, reason)
            }
            Ok(()) => {
                let last_mover = 1 - self.current;
                let next = self.current;
                let (last_score, next_score) = (self.score_of(last_mover), self.score_of(next));
                if last_score > next_score {
                    (last_mover, next, Reason::FairPlay)
                } else if next_score > last_score {
                    (next, last_mover, Reason::FairPlay)
                } else {
                    (last_mover, next, Reason::FairPlayTie)
                }
            }
        }
    }

    async fn announce(&mut self, winner: usize, loser: usize, reason: Reason) {
        let (winner_message, loser_message) = if reason == Reason::FairPlayTie {
            (TIE_MESSAGE, TIE_MESSAGE)
        } else {
            (WINNER_MESSAGE, LOSER_MESSAGE)
        };

        for (seat, message) in [(winner, winner_message), (loser, loser_message)] {
            if self.players[seat].send(message).await.is_err() {
                debug!(
                    "Game {}: '{}' did not receive the final message",
                    self.id, self.players[seat].name
                );
            }
        }
    }
}
