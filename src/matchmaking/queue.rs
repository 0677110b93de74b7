//! FIFO matchmaking queue shared by registrars and game workers
//!
//! A single mutex guards the waiting tickets. Removing a ticket under that
//! mutex is what claims it: once a game worker has taken two tickets out, a
//! registrar's withdrawal finds nothing to remove, and once a registrar has
//! withdrawn, no game worker can select it.

use crate::matchmaking::registration::{ClaimedTicket, Ticket};
use crate::types::RegistrationId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Result of a withdrawal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// The ticket was still waiting and has been removed
    Withdrawn,
    /// A game worker claimed the ticket first; the registration belongs to a game now
    AlreadyClaimed,
}

/// Statistics about queue operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub withdrawn: u64,
    pub pairs_formed: u64,
    pub waiting: usize,
}

/// The matchmaking queue
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    waiting: Mutex<VecDeque<Ticket>>,
    pair_ready: Notify,
    enqueued: AtomicU64,
    withdrawn: AtomicU64,
    pairs_formed: AtomicU64,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Ticket>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.waiting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a ticket; wakes one game worker once a pair is available.
    /// Returns the queue length after the append.
    pub fn enqueue(&self, ticket: Ticket) -> usize {
        let mut waiting = self.lock();
        debug!(
            "Enqueueing registration {} ('{}')",
            ticket.registration_id, ticket.name
        );
        waiting.push_back(ticket);
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        let size = waiting.len();
        if size >= 2 {
            debug!("Queue has {} registrations, signalling a game worker", size);
            self.pair_ready.notify_one();
        }
        size
    }

    /// Remove the two oldest tickets if present.
    ///
    /// Both tickets leave the queue in one critical section, which makes them
    /// unwithdrawable before the lock is released. If another pair is still
    /// waiting afterwards, one more worker is woken.
    pub fn try_claim_pair(&self) -> Option<[ClaimedTicket; 2]> {
        let mut waiting = self.lock();
        if waiting.len() < 2 {
            return None;
        }

        let first = waiting.pop_front()?;
        let second = waiting.pop_front()?;
        self.pairs_formed.fetch_add(1, Ordering::Relaxed);

        if waiting.len() >= 2 {
            self.pair_ready.notify_one();
        }

        info!(
            "Paired '{}' with '{}' ({} still waiting)",
            first.name,
            second.name,
            waiting.len()
        );
        Some([ClaimedTicket::new(first), ClaimedTicket::new(second)])
    }

    /// Wait until a pair can be claimed, then claim it
    pub async fn claim_pair(&self) -> [ClaimedTicket; 2] {
        loop {
            let notified = self.pair_ready.notified();
            if let Some(pair) = self.try_claim_pair() {
                return pair;
            }
            notified.await;
        }
    }

    /// Remove a ticket if it has not been claimed yet
    pub fn withdraw(&self, registration_id: RegistrationId) -> WithdrawOutcome {
        let mut waiting = self.lock();
        match waiting
            .iter()
            .position(|ticket| ticket.registration_id == registration_id)
        {
            Some(index) => {
                waiting.remove(index);
                self.withdrawn.fetch_add(1, Ordering::Relaxed);
                WithdrawOutcome::Withdrawn
            }
            None => WithdrawOutcome::AlreadyClaimed,
        }
    }

    /// Whether a registration is still waiting (and therefore still withdrawable)
    pub fn is_waiting(&self, registration_id: RegistrationId) -> bool {
        self.lock()
            .iter()
            .any(|ticket| ticket.registration_id == registration_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of waiting players in arrival order
    pub fn waiting_names(&self) -> Vec<String> {
        self.lock().iter().map(|ticket| ticket.name.clone()).collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            withdrawn: self.withdrawn.load(Ordering::Relaxed),
            pairs_formed: self.pairs_formed.load(Ordering::Relaxed),
            waiting: self.len(),
        }
    }
}
