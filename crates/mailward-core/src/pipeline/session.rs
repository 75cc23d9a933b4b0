//! Per-session state machine
//!
//! `OPEN → CONNECTION_CHECKED → SENDER_CHECKED → {RECIPIENT_CHECKED}* →
//! PUBLISHED | ABORTED`. Terminal states never leave; a stage that passed
//! is never re-run.

use mailward_common::types::{ConnectionContext, Verdict};
use std::net::IpAddr;

/// Where a session currently is in the validation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    ConnectionChecked,
    SenderChecked,
    RecipientChecked,
    /// Terminal: the context was handed to the queue publisher
    Published,
    /// Terminal: some stage rejected or deferred
    Aborted,
}

impl SessionState {
    /// Whether the session can make no further progress
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Published | SessionState::Aborted)
    }
}

/// One SMTP session's validation state and accumulated context
///
/// Owned by exactly one connection; hooks for the same session are
/// strictly sequential, so no locking is needed.
#[derive(Debug, Clone)]
pub struct Session {
    pub context: ConnectionContext,
    state: SessionState,
}

impl Session {
    /// Start a session for a new connection
    pub fn new(remote_addr: IpAddr) -> Self {
        Self {
            context: ConnectionContext::new(remote_addr),
            state: SessionState::Open,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance on acceptance, abort otherwise; returns the verdict unchanged
    pub(crate) fn apply(&mut self, verdict: Verdict, next: SessionState) -> Verdict {
        if verdict.is_accepted() {
            self.state = next;
        } else {
            self.state = SessionState::Aborted;
        }
        verdict
    }
}
