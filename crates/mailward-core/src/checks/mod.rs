//! Admission checks
//!
//! Each check is independent, talks to one external collaborator, and
//! produces a [`Verdict`]. Unavailability behavior is an explicit
//! [`FailurePolicy`] on the check rather than a convention at call sites:
//! the HTTP services and the reputation zone are advisory (fail open by
//! default), the hostname forward-confirmation fails closed since forged
//! hostnames are exactly what it exists to stop.
//!
//! [`Verdict`]: mailward_common::types::Verdict
//! [`FailurePolicy`]: mailward_common::types::FailurePolicy

pub mod greylist;
pub mod hostname;
pub mod rbl;
pub mod recipient;

pub use greylist::GreylistClient;
pub use hostname::HostnameVerifier;
pub use rbl::RblClient;
pub use recipient::RecipientClient;

use serde::{Deserialize, Serialize};

/// Shared-secret header expected by both policy services
pub(crate) const REMOTE_SECRET_HEADER: &str = "X-remoteSecret";

/// Response body of both policy services
#[derive(Debug, Deserialize)]
pub(crate) struct CheckResponse {
    pub ok: bool,
}

/// What a policy service said, before the check's own policy is applied
#[derive(Debug)]
pub(crate) enum ServiceAnswer {
    /// The service answered `{"ok": ...}`
    Answered(bool),
    /// Transport error, non-2xx status, or malformed body
    Unavailable(String),
}

/// POST a JSON body to a policy service and read its `{ok}` answer
pub(crate) async fn post_policy_check<T: Serialize>(
    http: &reqwest::Client,
    url: &str,
    secret: &str,
    body: &T,
) -> ServiceAnswer {
    let response = match http
        .post(url)
        .header(REMOTE_SECRET_HEADER, secret)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(body)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return ServiceAnswer::Unavailable(e.to_string()),
    };

    if !response.status().is_success() {
        return ServiceAnswer::Unavailable(format!("status {}", response.status()));
    }

    match response.json::<CheckResponse>().await {
        Ok(body) => ServiceAnswer::Answered(body.ok),
        Err(e) => ServiceAnswer::Unavailable(format!("malformed response: {}", e)),
    }
}
