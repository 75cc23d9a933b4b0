//! Mailward Core - Inbound mail admission pipeline
//!
//! This crate implements the policy checks invoked by the external SMTP
//! session engine at four hook points (connection open, sender declared,
//! recipient declared, message complete), the orchestrating validators
//! composing them, and the queue publisher handing accepted sessions to
//! downstream processing.

pub mod checks;
pub mod dns;
pub mod pipeline;
pub mod queue;

pub use checks::{GreylistClient, HostnameVerifier, RblClient, RecipientClient};
pub use dns::{DnsResolver, LookupError, SystemResolver};
pub use pipeline::{Pipeline, Session, SessionState};
pub use queue::{JobQueue, MailJob, PgJobQueue};
