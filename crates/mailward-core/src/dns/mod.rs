//! DNS resolution seam
//!
//! The checks talk to DNS through the [`DnsResolver`] trait so the
//! fail-open/fail-closed contracts can be exercised in tests without a
//! network. [`SystemResolver`] is the production implementation backed by
//! trust-dns.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

/// Outcome of a failed lookup
///
/// The distinction matters: an authoritative "no records" answer is a
/// policy signal (not listed, no such host), while an infrastructure
/// failure is subject to each check's [`FailurePolicy`].
///
/// [`FailurePolicy`]: mailward_common::types::FailurePolicy
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no records found for {0}")]
    NotFound(String),

    #[error("dns lookup failed: {0}")]
    Failed(String),
}

/// Asynchronous DNS resolution used by the admission checks
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolve A records for a name
    async fn ipv4_lookup(&self, name: &str) -> Result<Vec<Ipv4Addr>, LookupError>;

    /// Resolve PTR records for an address (engine-side reverse lookup)
    async fn reverse_lookup(&self, addr: IpAddr) -> Result<Vec<String>, LookupError>;
}

/// DNS resolver backed by trust-dns
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    /// Create a resolver using the default system configuration
    pub fn new() -> Self {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self { resolver }
    }

    /// Create a resolver from an existing trust-dns resolver
    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn map_error(name: &str, e: trust_dns_resolver::error::ResolveError) -> LookupError {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => LookupError::NotFound(name.to_string()),
        _ => LookupError::Failed(e.to_string()),
    }
}

/// In-memory resolver used by unit tests across the crate
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MockResolver {
        pub a_records: HashMap<String, Vec<Ipv4Addr>>,
        pub ptr_records: HashMap<IpAddr, Vec<String>>,
        /// Names for which lookups fail with an infrastructure error
        pub failing: Vec<String>,
    }

    impl MockResolver {
        pub fn with_a(mut self, name: &str, addrs: Vec<Ipv4Addr>) -> Self {
            self.a_records.insert(name.to_string(), addrs);
            self
        }

        pub fn with_failure(mut self, name: &str) -> Self {
            self.failing.push(name.to_string());
            self
        }
    }

    #[async_trait]
    impl DnsResolver for MockResolver {
        async fn ipv4_lookup(&self, name: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
            if self.failing.iter().any(|n| n == name) {
                return Err(LookupError::Failed("simulated outage".to_string()));
            }
            match self.a_records.get(name) {
                Some(addrs) => Ok(addrs.clone()),
                None => Err(LookupError::NotFound(name.to_string())),
            }
        }

        async fn reverse_lookup(&self, addr: IpAddr) -> Result<Vec<String>, LookupError> {
            match self.ptr_records.get(&addr) {
                Some(names) => Ok(names.clone()),
                None => Err(LookupError::NotFound(addr.to_string())),
            }
        }
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn ipv4_lookup(&self, name: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        let lookup = self
            .resolver
            .ipv4_lookup(name)
            .await
            .map_err(|e| map_error(name, e))?;

        Ok(lookup.iter().map(|record| (*record).into()).collect())
    }

    async fn reverse_lookup(&self, addr: IpAddr) -> Result<Vec<String>, LookupError> {
        let lookup = self
            .resolver
            .reverse_lookup(addr)
            .await
            .map_err(|e| map_error(&addr.to_string(), e))?;

        Ok(lookup
            .iter()
            .map(|ptr| ptr.0.to_string().trim_end_matches('.').to_string())
            .collect())
    }
}
