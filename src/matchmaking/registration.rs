//! Registrations and the registrar-to-game hand-off
//!
//! A registration is owned by its registrar worker until a game worker claims
//! it. The claim is delivered over a single-use channel carrying a reply
//! sender; the registrar answers with a [`HandOff`] that moves the connection
//! (and any line it read after being claimed) to the gameplay stage without
//! closing the socket.

use crate::error::ChanceItError;
use crate::net::Connection;
use crate::pool::Recyclable;
use crate::types::{RegistrationId, WaitState};
use crate::utils::{current_timestamp, generate_registration_id};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

/// Everything the gameplay stage takes over from a claimed registration
#[derive(Debug)]
pub struct HandOff {
    pub registration_id: RegistrationId,
    pub name: String,
    pub connection: Connection,
    /// A gameplay line the registrar consumed after the claim; it takes precedence over the socket
    pub captured_line: Option<String>,
}

/// Sender the registrar uses to deliver its hand-off
pub type HandOffReply = oneshot::Sender<HandOff>;

/// Queue entry for one waiting registration
#[derive(Debug)]
pub struct Ticket {
    pub registration_id: RegistrationId,
    pub name: String,
    pub enqueued_at: DateTime<Utc>,
    claim_tx: oneshot::Sender<HandOffReply>,
}

impl Ticket {
    /// Create a ticket and the registrar-side signal that fires when it is claimed
    pub fn new(registration_id: RegistrationId, name: impl Into<String>) -> (Self, ClaimSignal) {
        let (claim_tx, claim_rx) = oneshot::channel();
        (
            Self {
                registration_id,
                name: name.into(),
                enqueued_at: current_timestamp(),
                claim_tx,
            },
            ClaimSignal { rx: claim_rx },
        )
    }
}

/// A ticket removed from the queue by a game worker; it can no longer be withdrawn
#[derive(Debug)]
pub struct ClaimedTicket {
    ticket: Ticket,
}

impl ClaimedTicket {
    pub(crate) fn new(ticket: Ticket) -> Self {
        Self { ticket }
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.ticket.registration_id
    }

    pub fn name(&self) -> &str {
        &self.ticket.name
    }

    /// Tell the registrar it has been claimed and collect its connection
    pub async fn collect(self, limit: Duration) -> Result<HandOff, ChanceItError> {
        let registration_id = self.ticket.registration_id;
        let failed = |reason: &str| ChanceItError::HandOffFailed {
            registration_id: registration_id.to_string(),
            reason: reason.to_string(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.ticket
            .claim_tx
            .send(reply_tx)
            .map_err(|_| failed("registrar is no longer listening"))?;

        match tokio::time::timeout(limit, reply_rx).await {
            Ok(Ok(handoff)) => Ok(handoff),
            Ok(Err(_)) => Err(failed("registrar dropped the connection")),
            Err(_) => Err(failed("registrar did not respond in time")),
        }
    }
}

/// Registrar-side view of the claim channel
#[derive(Debug)]
pub struct ClaimSignal {
    rx: oneshot::Receiver<HandOffReply>,
}

impl ClaimSignal {
    /// Non-blocking check for a claim
    pub fn try_claimed(&mut self) -> Option<HandOffReply> {
        self.rx.try_recv().ok()
    }

    /// Wait for the claim; `None` if the claiming side went away
    pub async fn claimed(&mut self) -> Option<HandOffReply> {
        (&mut self.rx).await.ok()
    }
}

/// Registrar-owned state for the client currently being served
#[derive(Debug)]
pub struct Registration {
    pub id: RegistrationId,
    pub name: Option<String>,
    state: WaitState,
    pub captured_line: Option<String>,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            id: generate_registration_id(),
            name: None,
            state: WaitState::AwaitingGreeting,
            captured_line: None,
        }
    }
}

impl Registration {
    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Move to `next`, refusing transitions the state machine does not allow
    pub fn transition(&mut self, next: WaitState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            warn!(
                "Registration {} refused transition {} -> {}",
                self.id, self.state, next
            );
            false
        }
    }
}

impl Recyclable for Registration {
    fn reset(&mut self) {
        *self = Registration::default();
    }
}
