//! Common types for Mailward

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim_start_matches('<').trim_end_matches('>');
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1].to_lowercase()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Session("Invalid email address".to_string()))
    }
}

/// Message envelope (SMTP level)
///
/// The recipient list is append-only for the lifetime of a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender (MAIL FROM)
    pub from: Option<EmailAddress>,

    /// Accepted recipients (RCPT TO), in order of acceptance
    pub to: Vec<EmailAddress>,
}

/// Per-connection state accumulated across the validation hooks
///
/// Owned exclusively by one SMTP session. Crosses the system boundary
/// (serialized into a queue job) at most once, at `mail_ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionContext {
    /// Remote IP address of the connecting client
    pub remote_addr: IpAddr,

    /// Hostname the client declared in HELO/EHLO
    pub host_name_appears_as: Option<String>,

    /// Hostname derived by the engine (reverse DNS of the remote address)
    pub client_hostname: Option<String>,

    /// Envelope, filled in across hooks
    pub envelope: Envelope,

    /// Completion timestamp, stamped at `mail_ready`
    pub date: Option<Timestamp>,
}

impl ConnectionContext {
    /// Create a fresh context for a new connection
    pub fn new(remote_addr: IpAddr) -> Self {
        Self {
            remote_addr,
            host_name_appears_as: None,
            client_hostname: None,
            envelope: Envelope::default(),
            date: None,
        }
    }
}

/// Greylisting identity: (client IP, sender, recipient)
///
/// Derived per recipient, never stored. Serializes directly into the
/// greylist service request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triplet {
    pub ip: String,
    pub from: String,
    pub to: String,
}

impl Triplet {
    /// Derive the triplet for a candidate recipient
    pub fn derive(context: &ConnectionContext, to: &EmailAddress) -> Self {
        Self {
            ip: context.remote_addr.to_string(),
            from: context
                .envelope
                .from
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_default(),
            to: to.to_string(),
        }
    }
}

/// Outcome of a single policy check
///
/// Immutable once produced; consumed by the orchestrating validator and
/// decoded into a protocol status line at the SMTP-engine boundary.
/// Policy checks answer with 530/550 (rejected) or 451 (deferred); a
/// `Rejected` carrying 503 is the engine-boundary answer to a hook
/// invoked out of sequence, not a policy decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected { code: u16, message: String },
    Deferred { code: u16, message: String },
}

impl Verdict {
    /// Permanent policy rejection with an SMTP status code
    pub fn reject(code: u16, message: impl Into<String>) -> Self {
        Verdict::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Temporary rejection (greylist-style, expected to be retried)
    pub fn defer(code: u16, message: impl Into<String>) -> Self {
        Verdict::Deferred {
            code,
            message: message.into(),
        }
    }

    /// Whether the check passed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    /// SMTP status code carried by a rejection or deferral
    pub fn code(&self) -> Option<u16> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected { code, .. } | Verdict::Deferred { code, .. } => Some(*code),
        }
    }
}

/// Behavior of a check when its external collaborator is unavailable
///
/// Makes the fail-open/fail-closed asymmetry between checks an explicit,
/// testable contract instead of a per-call-site convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat the check as passed; the collaborator is advisory
    AcceptOpen,
    /// Defer the step; the collaborator is authoritative
    RejectClosed,
}
