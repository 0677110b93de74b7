//! Session registrar: drives one connection from greeting to hand-off
//!
//! A registrar owns its connection until either the player leaves the queue
//! (GOODBYE or end of stream) or a game worker claims the registration. The
//! claim arrives on the ticket's single-use channel and is raced against the
//! bounded line reads, so a claimed registrar hands its connection over as
//! soon as it is asked instead of waiting out a poll interval.

use crate::matchmaking::{
    ClaimSignal, HandOff, HandOffReply, MatchmakingQueue, Registration, Ticket, WithdrawOutcome,
};
use crate::metrics::MetricsCollector;
use crate::net::{Connection, ReadOutcome};
use crate::pool::Engagement;
use crate::types::{WaitState, GOODBYE_PREFIX, HELLO_ACK, HELLO_PREFIX};
use crate::utils::parse_named_command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a registrar run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The stream ended before a valid HELLO
    ClosedBeforeGreeting,
    /// GOODBYE removed the player from the queue; the connection is closed
    Withdrawn,
    /// End of stream removed the player from the queue
    Disconnected,
    /// The connection now belongs to a game worker
    HandedOff,
    /// The claiming game worker went away before taking the connection
    Abandoned,
}

pub struct Registrar {
    queue: Arc<MatchmakingQueue>,
    metrics: Arc<MetricsCollector>,
    withdrawal_poll: Duration,
    engagement: Engagement,
}

impl Registrar {
    pub fn new(
        queue: Arc<MatchmakingQueue>,
        metrics: Arc<MetricsCollector>,
        withdrawal_poll: Duration,
    ) -> Self {
        Self {
            queue,
            metrics,
            withdrawal_poll,
            engagement: Engagement::default(),
        }
    }

    /// Registrars currently serving a connection
    pub fn engaged(&self) -> usize {
        self.engagement.current()
    }

    /// Run the registration protocol for one accepted connection
    pub async fn serve(
        &self,
        registration: &mut Registration,
        mut connection: Connection,
    ) -> RegistrationOutcome {
        let _engaged = self.engagement.enter();
        self.metrics.record_connection_accepted();
        debug!("Registration {} serving {}", registration.id, connection.peer());

        let name = match self.await_greeting(&mut connection).await {
            Some(name) => name,
            None => {
                debug!("{} closed before saying HELLO", connection.peer());
                return RegistrationOutcome::ClosedBeforeGreeting;
            }
        };

        if let Err(e) = connection.send_line(HELLO_ACK).await {
            debug!("Could not acknowledge '{}': {}", name, e);
            return RegistrationOutcome::ClosedBeforeGreeting;
        }

        registration.name = Some(name.clone());
        let (ticket, signal) = Ticket::new(registration.id, name.clone());
        registration.transition(WaitState::AwaitingWithdrawal);
        let waiting = self.queue.enqueue(ticket);
        self.metrics.record_registration(waiting);
        info!(
            "👋 '{}' registered ({}), {} waiting",
            name, registration.id, waiting
        );

        self.await_pairing(registration, connection, signal).await
    }

    async fn await_greeting(&self, connection: &mut Connection) -> Option<String> {
        while let Some(line) = connection.next_line().await {
            match parse_named_command(&line, HELLO_PREFIX) {
                Some(name) => return Some(name.to_string()),
                None => debug!("Ignoring {:?} while awaiting HELLO", line),
            }
        }
        None
    }

    async fn await_pairing(
        &self,
        registration: &mut Registration,
        mut connection: Connection,
        mut signal: ClaimSignal,
    ) -> RegistrationOutcome {
        loop {
            let read = tokio::select! {
                biased;
                reply = signal.claimed() => {
                    return match reply {
                        Some(reply) => self.hand_off(registration, connection, reply).await,
                        None => self.abandon(registration, connection).await,
                    };
                }
                read = connection.read_line_within(self.withdrawal_poll) => read,
            };

            match read {
                ReadOutcome::TimedOut => continue,
                ReadOutcome::Line(line) => {
                    if parse_named_command(&line, GOODBYE_PREFIX).is_some() {
                        return self
                            .withdraw(registration, connection, signal, RegistrationOutcome::Withdrawn)
                            .await;
                    }
                    if let Some(reply) = signal.try_claimed() {
                        // Claimed while this line was in flight; it belongs to the game
                        registration.captured_line = Some(line);
                        return self.hand_off(registration, connection, reply).await;
                    }
                    if !self.queue.is_waiting(registration.id) {
                        // Out of the queue but the claim has not been delivered yet
                        registration.captured_line = Some(line);
                        return self.await_claim(registration, connection, signal).await;
                    }
                    debug!("Ignoring {:?} from waiting player {}", line, registration.id);
                }
                ReadOutcome::Closed => {
                    return self
                        .withdraw(registration, connection, signal, RegistrationOutcome::Disconnected)
                        .await;
                }
            }
        }
    }

    /// Leave the queue if still waiting; a registration that was already
    /// claimed is handed off instead
    async fn withdraw(
        &self,
        registration: &mut Registration,
        connection: Connection,
        signal: ClaimSignal,
        outcome: RegistrationOutcome,
    ) -> RegistrationOutcome {
        registration.transition(WaitState::AwaitingQueueRemoval);

        match self.queue.withdraw(registration.id) {
            WithdrawOutcome::Withdrawn => {
                self.metrics.record_withdrawal(self.queue.len());
                info!(
                    "'{}' left the queue ({:?})",
                    registration.name.as_deref().unwrap_or_default(),
                    outcome
                );
                connection.close().await;
                outcome
            }
            WithdrawOutcome::AlreadyClaimed => {
                debug!(
                    "Registration {} already claimed, handing off instead of withdrawing",
                    registration.id
                );
                self.await_claim(registration, connection, signal).await
            }
        }
    }

    /// Wait for the game worker that already removed this registration from the queue
    async fn await_claim(
        &self,
        registration: &mut Registration,
        connection: Connection,
        mut signal: ClaimSignal,
    ) -> RegistrationOutcome {
        match signal.claimed().await {
            Some(reply) => self.hand_off(registration, connection, reply).await,
            None => self.abandon(registration, connection).await,
        }
    }

    async fn hand_off(
        &self,
        registration: &mut Registration,
        connection: Connection,
        reply: HandOffReply,
    ) -> RegistrationOutcome {
        registration.transition(WaitState::AwaitingTurn);
        let name = registration.name.clone().unwrap_or_default();

        let handoff = HandOff {
            registration_id: registration.id,
            name: name.clone(),
            connection,
            captured_line: registration.captured_line.clone(),
        };

        match reply.send(handoff) {
            Ok(()) => {
                debug!("Handed '{}' ({}) to a game worker", name, registration.id);
                RegistrationOutcome::HandedOff
            }
            Err(handoff) => {
                warn!("Game worker gave up on '{}' before the hand-off", name);
                handoff.connection.close().await;
                RegistrationOutcome::Abandoned
            }
        }
    }

    async fn abandon(
        &self,
        registration: &mut Registration,
        connection: Connection,
    ) -> RegistrationOutcome {
        warn!(
            "Registration {} was claimed but never collected, closing",
            registration.id
        );
        connection.close().await;
        RegistrationOutcome::Abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::ClaimedTicket;
    use crate::net::connection::test_support::{connection_pair, TestClient};

    const POLL: Duration = Duration::from_millis(100);

    fn registrar(queue: &Arc<MatchmakingQueue>) -> Arc<Registrar> {
        Arc::new(Registrar::new(
            queue.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
            POLL,
        ))
    }

    /// Start serving a fresh connection; returns the run and the client end
    fn spawn_serve(
        registrar: &Arc<Registrar>,
    ) -> (
        tokio::task::JoinHandle<(RegistrationOutcome, Registration)>,
        TestClient,
    ) {
        let (connection, client) = connection_pair("test");
        let registrar = registrar.clone();
        let task = tokio::spawn(async move {
            let mut registration = Registration::default();
            let outcome = registrar.serve(&mut registration, connection).await;
            (outcome, registration)
        });
        (task, client)
    }

    async fn wait_until_queued(queue: &MatchmakingQueue, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while queue.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registration never reached the queue");
    }

    #[tokio::test]
    async fn test_hello_is_acknowledged_and_enqueued() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (_task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:").await;
        client.send("hi there").await;
        client.send("HELLO:ann").await;

        assert_eq!(client.recv().await.as_deref(), Some(HELLO_ACK));
        wait_until_queued(&queue, 1).await;
        assert_eq!(queue.waiting_names(), vec!["ann".to_string()]);
        assert_eq!(registrar.engaged(), 1);
    }

    #[tokio::test]
    async fn test_close_before_hello() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:").await;
        drop(client);

        let (outcome, registration) = task.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::ClosedBeforeGreeting);
        assert_eq!(registration.state(), WaitState::AwaitingGreeting);
        assert!(queue.is_empty());
        assert_eq!(registrar.engaged(), 0);
    }

    #[tokio::test]
    async fn test_goodbye_withdraws_and_closes() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:ann").await;
        client.recv().await;
        wait_until_queued(&queue, 1).await;
        client.send("GOODBYE:ann").await;

        let (outcome, registration) = task.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::Withdrawn);
        assert_eq!(registration.state(), WaitState::AwaitingQueueRemoval);
        assert!(queue.is_empty());
        assert_eq!(client.recv().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_while_waiting_withdraws() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:ann").await;
        client.recv().await;
        wait_until_queued(&queue, 1).await;
        drop(client);

        let (outcome, _) = task.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::Disconnected);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().withdrawn, 1);
    }

    async fn claim_one(queue: &MatchmakingQueue) -> [ClaimedTicket; 2] {
        tokio::time::timeout(Duration::from_secs(1), queue.claim_pair())
            .await
            .expect("no pair formed")
    }

    #[tokio::test]
    async fn test_claim_hands_off_without_closing() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task_a, mut client_a) = spawn_serve(&registrar);
        let (task_b, mut client_b) = spawn_serve(&registrar);

        client_a.send("HELLO:ann").await;
        client_a.recv().await;
        wait_until_queued(&queue, 1).await;
        client_b.send("HELLO:bob").await;
        client_b.recv().await;
        wait_until_queued(&queue, 2).await;

        let [a, b] = claim_one(&queue).await;
        let mut a = a.collect(Duration::from_millis(250)).await.unwrap();
        let b = b.collect(Duration::from_millis(250)).await.unwrap();
        assert_eq!(a.name, "ann");
        assert_eq!(b.name, "bob");

        let (outcome, registration) = task_a.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::HandedOff);
        assert_eq!(registration.state(), WaitState::AwaitingTurn);
        assert_eq!(task_b.await.unwrap().0, RegistrationOutcome::HandedOff);

        // The socket survived the hand-off in both directions
        a.connection.send_line("Opponent: bob").await.unwrap();
        assert_eq!(client_a.recv().await.as_deref(), Some("Opponent: bob"));
        client_a.send("n").await;
        assert_eq!(a.connection.next_line().await.as_deref(), Some("n"));
        drop(client_b);
    }

    #[tokio::test]
    async fn test_goodbye_after_claim_still_hands_off() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:ann").await;
        client.recv().await;
        wait_until_queued(&queue, 1).await;

        // Claim ann directly, then have her say goodbye before the claim is signalled
        let (other, _other_signal) = Ticket::new(crate::utils::generate_registration_id(), "bob");
        queue.enqueue(other);
        let [ann, _bob] = claim_one(&queue).await;
        client.send("GOODBYE:ann").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handoff = ann.collect(Duration::from_millis(250)).await.unwrap();
        assert_eq!(handoff.name, "ann");
        let (outcome, registration) = task.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::HandedOff);
        assert_eq!(registration.state(), WaitState::AwaitingTurn);
    }

    #[tokio::test]
    async fn test_line_racing_the_claim_reaches_the_game_once() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:ann").await;
        client.recv().await;
        wait_until_queued(&queue, 1).await;

        let (other, _other_signal) = Ticket::new(crate::utils::generate_registration_id(), "bob");
        queue.enqueue(other);
        let [ann, _bob] = claim_one(&queue).await;

        // The answer is typed while the claim is still being delivered
        client.send("chance-it").await;
        let mut handoff = ann.collect(Duration::from_millis(250)).await.unwrap();
        let (outcome, registration) = task.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::HandedOff);

        // Whichever reader saw it, the line is delivered exactly once
        let line = match handoff.captured_line.take() {
            Some(line) => {
                assert_eq!(registration.captured_line.as_deref(), Some(line.as_str()));
                line
            }
            None => handoff.connection.next_line().await.unwrap(),
        };
        assert_eq!(line, "chance-it");
        assert_eq!(
            handoff
                .connection
                .read_line_within(Duration::from_millis(50))
                .await,
            ReadOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_line_between_pairing_and_claim_is_kept_for_the_game() {
        let queue = Arc::new(MatchmakingQueue::new());
        let registrar = registrar(&queue);
        let (task, mut client) = spawn_serve(&registrar);

        client.send("HELLO:ann").await;
        client.recv().await;
        wait_until_queued(&queue, 1).await;

        let (other, _other_signal) = Ticket::new(crate::utils::generate_registration_id(), "bob");
        queue.enqueue(other);
        let [ann, _bob] = queue.try_claim_pair().expect("two tickets are waiting");

        // Paired but not yet collected: the registrar reads this line itself
        client.send("Y").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut handoff = ann.collect(Duration::from_millis(250)).await.unwrap();
        let (outcome, registration) = task.await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::HandedOff);
        assert_eq!(handoff.captured_line.as_deref(), Some("Y"));
        assert_eq!(registration.captured_line.as_deref(), Some("Y"));
        assert_eq!(
            handoff
                .connection
                .read_line_within(Duration::from_millis(50))
                .await,
            ReadOutcome::TimedOut
        );
    }
}
