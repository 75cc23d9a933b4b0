//! Real-time blacklist (RBL) lookup
//!
//! RBL protocol convention: the client octets are reversed, suffixed with
//! the reputation zone, and queried for A records. The presence of *any*
//! answer record is the "listed" signal; an authoritative NXDOMAIN is
//! "not listed". Which reserved loopback value comes back only matters for
//! log detail, never for the decision.

use crate::dns::{DnsResolver, LookupError};
use mailward_common::types::{FailurePolicy, Verdict};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Spamhaus ZEN return codes, for diagnostic logging only
fn category(addr: Ipv4Addr) -> &'static str {
    match addr.octets() {
        [127, 0, 0, 2] => "SBL - Spamhaus Maintained",
        [127, 0, 0, 3] => "- - reserved for future use",
        [127, 0, 0, 4] => "XBL - CBL Detected Address",
        [127, 0, 0, 5] => "XBL - NJABL Proxies (customized)",
        [127, 0, 0, 6] | [127, 0, 0, 7] | [127, 0, 0, 8] => "XBL - reserved for future use",
        [127, 0, 0, 9] => "- - reserved for future use",
        [127, 0, 0, 10] => "PBL - ISP Maintained",
        [127, 0, 0, 11] => "PBL - Spamhaus Maintained",
        _ => "unknown return code",
    }
}

/// Reverse the octets of an IPv4 address for an RBL query
fn reverse_octets(addr: Ipv4Addr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("{}.{}.{}.{}", d, c, b, a)
}

/// Reputation resolver querying a DNS blacklist zone
pub struct RblClient<R> {
    resolver: Arc<R>,
    zone: String,
    on_unavailable: FailurePolicy,
}

impl<R: DnsResolver> RblClient<R> {
    /// Create a new client for a reputation zone
    pub fn new(resolver: Arc<R>, zone: impl Into<String>, on_unavailable: FailurePolicy) -> Self {
        Self {
            resolver,
            zone: zone.into(),
            on_unavailable,
        }
    }

    /// Check a client address against the reputation zone
    ///
    /// One query per connection, no retry. IPv6 peers are not queried
    /// (the zone is keyed by IPv4 octets) and pass.
    pub async fn check(&self, remote_addr: IpAddr) -> Verdict {
        let addr = match remote_addr {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                debug!(%remote_addr, "skipping reputation lookup for IPv6 peer");
                return Verdict::Accepted;
            }
        };

        let query = format!("{}.{}", reverse_octets(addr), self.zone);

        match self.resolver.ipv4_lookup(&query).await {
            Ok(answers) if !answers.is_empty() => {
                let categories: Vec<&str> = answers.iter().map(|a| category(*a)).collect();
                info!(%remote_addr, ?answers, ?categories, "connection rejected by reputation zone");
                Verdict::reject(530, "Your IP is Blacklisted by Spamhaus")
            }
            Ok(_) | Err(LookupError::NotFound(_)) => {
                info!(%remote_addr, "connection accepted (not listed)");
                Verdict::Accepted
            }
            Err(LookupError::Failed(e)) => {
                error!(%remote_addr, error = %e, "reputation zone unreachable");
                match self.on_unavailable {
                    FailurePolicy::AcceptOpen => Verdict::Accepted,
                    FailurePolicy::RejectClosed => {
                        Verdict::defer(451, "Reputation service unavailable, try again later")
                    }
                }
            }
        }
    }
}
