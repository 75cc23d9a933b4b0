//! Recipient directory check
//!
//! Asks the external recipient service whether a destination address is
//! locally deliverable. The service is advisory infrastructure: when it is
//! unreachable the check fails open by default, and only an explicit
//! `ok: false` rejects the recipient.

use crate::checks::{post_policy_check, ServiceAnswer};
use mailward_common::types::{EmailAddress, FailurePolicy, Verdict};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct RecipientRequest<'a> {
    to: &'a str,
}

/// HTTP client for the recipient directory service
pub struct RecipientClient {
    http: reqwest::Client,
    url: String,
    secret: String,
    on_unavailable: FailurePolicy,
}

impl RecipientClient {
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

    /// Check whether a candidate recipient is locally deliverable
    pub async fn check(&self, to: &EmailAddress) -> Verdict {
        let address = to.to_string();
        let request = RecipientRequest { to: &address };

        match post_policy_check(&self.http, &self.url, &self.secret, &request).await {
            ServiceAnswer::Answered(true) => {
                info!(to = %address, "recipient accepted (directory)");
                Verdict::Accepted
            }
            ServiceAnswer::Answered(false) => {
                info!(to = %address, "recipient rejected (directory)");
                Verdict::reject(
                    550,
                    "Recipient address rejected: User unknown in local recipient table",
                )
            }
            ServiceAnswer::Unavailable(reason) => {
                error!(to = %address, %reason, "service (recipient) not available");
                match self.on_unavailable {
                    FailurePolicy::AcceptOpen => Verdict::Accepted,
                    FailurePolicy::RejectClosed => {
                        Verdict::defer(451, "Recipient service unavailable, try again later")
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_subscriber::prelude::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap()
    }

    fn client(url: String) -> RecipientClient {
        RecipientClient::new(http_client(), url, "s3cret", FailurePolicy::AcceptOpen)
    }

    fn user() -> EmailAddress {
        EmailAddress::parse("user@local.test").unwrap()
    }

    #[tokio::test]
    async fn test_known_recipient_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check-recipient"))
            .and(header("X-remoteSecret", "s3cret"))
            .and(body_json(serde_json::json!({"to": "user@local.test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let verdict = client(format!("{}/check-recipient", server.uri()))
            .check(&user())
            .await;
        assert!(verdict.is_accepted());
    }

    #[tokio::test]
    async fn test_unknown_recipient_rejected_550() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false})),
            )
            .mount(&server)
            .await;

        let verdict = client(server.uri()).check(&user()).await;
        assert_eq!(verdict.code(), Some(550));
        assert!(matches!(verdict, Verdict::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_server_error_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let verdict = client(server.uri()).check(&user()).await;
        assert!(verdict.is_accepted());
    }

    #[tokio::test]
    async fn test_timeout_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let verdict = client(server.uri()).check(&user()).await;
        assert!(verdict.is_accepted());
    }

    #[tokio::test]
    async fn test_connection_refused_fails_open() {
        // Nothing listens on this port
        let verdict = client("http://127.0.0.1:9".to_string()).check(&user()).await;
        assert!(verdict.is_accepted());
    }

    #[tokio::test]
    async fn test_malformed_body_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let verdict = client(server.uri()).check(&user()).await;
        assert!(verdict.is_accepted());
    }

    #[tokio::test]
    async fn test_unavailable_service_logs_single_error() {
        struct ErrorCounter(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::ERROR {
                    self.0.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let verdict = client("http://127.0.0.1:9".to_string()).check(&user()).await;
        assert!(verdict.is_accepted());
        assert_eq!(errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unavailable_defers_when_closed() {
        let verdict = RecipientClient::new(
            http_client(),
            "http://127.0.0.1:9",
            "s3cret",
            FailurePolicy::RejectClosed,
        )
        .check(&user())
        .await;
        assert_eq!(verdict.code(), Some(451));
    }
}
