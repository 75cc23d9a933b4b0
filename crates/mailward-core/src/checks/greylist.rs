//! Greylist check
//!
//! Sends the (ip, sender, recipient) triplet to the external greylist
//! service. A triplet the service has not seen yet is deferred with a 451
//! so that legitimate senders retry and unsophisticated spam senders do
//! not. Like the recipient service, unavailability fails open by default.

use crate::checks::{post_policy_check, ServiceAnswer};
use mailward_common::types::{FailurePolicy, Triplet, Verdict};
use tracing::{error, info};

/// HTTP client for the greylist service
pub struct GreylistClient {
    http: reqwest::Client,
    url: String,
    secret: String,
    on_unavailable: FailurePolicy,
}

impl GreylistClient {
    /// Create a new client
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        secret: impl Into<String>,
        on_unavailable: FailurePolicy,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            secret: secret.into(),
            on_unavailable,
        }
    }

    /// Check a triplet against the greylist
    pub async fn check(&self, triplet: &Triplet) -> Verdict {
        match post_policy_check(&self.http, &self.url, &self.secret, triplet).await {
            ServiceAnswer::Answered(true) => {
                info!(?triplet, "recipient accepted (greylist)");
                Verdict::Accepted
            }
            ServiceAnswer::Answered(false) => {
                info!(?triplet, "recipient temporarily rejected (greylist)");
                Verdict::defer(451, "Greylisted: Please try again later")
            }
            ServiceAnswer::Unavailable(reason) => {
                error!(?triplet, %reason, "service (greylist) not available");
                match self.on_unavailable {
                    FailurePolicy::AcceptOpen => Verdict::Accepted,
                    FailurePolicy::RejectClosed => {
                        Verdict::defer(451, "Greylist service unavailable, try again later")
                    }
                }
            }
        }
    }
}
