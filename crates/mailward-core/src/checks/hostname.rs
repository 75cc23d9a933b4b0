//! Hostname authentication (simplified forward-confirmed reverse DNS)
//!
//! The engine has already done the reverse lookup; this check re-verifies
//! the forward direction (declared hostname resolves back to the observed
//! address) and the identity match between declared and derived hostnames.
//! Unlike the advisory HTTP checks, DNS failure here fails closed: a
//! hostname that cannot be confirmed is treated as forged.

use crate::dns::DnsResolver;
use mailward_common::types::Verdict;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

/// Whether a name is a syntactically valid fully-qualified domain name
///
/// Mirrors the common validator rules: at least two labels, labels of
/// 1..=63 alphanumeric-or-hyphen characters without edge hyphens, a
/// non-numeric TLD of at least two characters, total length within 253.
pub fn is_fqdn(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }

    // TLD must be at least two characters and not purely numeric
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || tld.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    true
}

/// Validates the client-declared hostname against the observed connection
pub struct HostnameVerifier<R> {
    resolver: Arc<R>,
}

impl<R: DnsResolver> HostnameVerifier<R> {
    /// Create a new verifier
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }

    /// Verify the declared hostname, short-circuiting on first failure
    ///
    /// `declared` is the HELO/EHLO hostname, `client_hostname` the
    /// engine-derived reverse-DNS name, `remote_addr` the observed peer.
    pub async fn verify(
        &self,
        declared: Option<&str>,
        client_hostname: Option<&str>,
        remote_addr: IpAddr,
    ) -> Verdict {
        let declared = match declared {
            Some(d) if is_fqdn(d) => d,
            _ => {
                info!(?declared, %remote_addr, "sender rejected (invalid hostname)");
                return Verdict::reject(530, "Invalid Hostname");
            }
        };

        let address_valid = self.check_a_record(declared, remote_addr).await;
        let identity_match = client_hostname == Some(declared);

        if identity_match && address_valid {
            info!(declared, %remote_addr, "sender accepted (valid hostname and mapping)");
            Verdict::Accepted
        } else {
            info!(
                declared,
                ?client_hostname,
                %remote_addr,
                address_valid,
                "sender rejected (invalid IP-domain mapping)"
            );
            Verdict::reject(530, "Invalid IP-Domain Mapping")
        }
    }

    /// Whether the declared hostname forward-resolves to the observed IP
    ///
    /// Any resolution error yields false (fail closed).
    async fn check_a_record(&self, domain: &str, remote_addr: IpAddr) -> bool {
        let remote_v4 = match remote_addr {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => return false,
        };

        match self.resolver.ipv4_lookup(domain).await {
            Ok(addrs) => addrs.contains(&remote_v4),
            Err(_) => false,
        }
    }
}
