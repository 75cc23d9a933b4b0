//! Orchestrating validators
//!
//! The external SMTP engine calls, in order, `validate_connection` →
//! `validate_sender` → `validate_recipient` (once per declared recipient)
//! → `mail_ready`. Each hook awaits a single terminal [`Verdict`]; the
//! engine maps rejections onto the protocol and aborts the stage. A hook
//! called out of order answers 503 without side effects, so a session that
//! was rejected at any earlier stage can never publish.

mod session;

pub use session::{Session, SessionState};

use crate::checks::{GreylistClient, HostnameVerifier, RblClient, RecipientClient};
use crate::dns::DnsResolver;
use crate::queue::{JobQueue, MailJob};
use chrono::Utc;
use mailward_common::types::{EmailAddress, Triplet, Verdict};
use tracing::{error, info, warn};

fn bad_sequence(hook: &str, state: SessionState) -> Verdict {
    warn!(hook, ?state, "hook invoked out of sequence");
    Verdict::reject(503, "Bad sequence of commands")
}

/// The admission pipeline for one deployment
///
/// Shared across sessions; holds only read-only configuration and pooled
/// clients. Per-session state lives in [`Session`].
pub struct Pipeline<R, Q> {
    rbl: RblClient<R>,
    hostname: HostnameVerifier<R>,
    recipient: RecipientClient,
    greylist: GreylistClient,
    queue: Q,
}

impl<R: DnsResolver, Q: JobQueue> Pipeline<R, Q> {
    /// Assemble a pipeline from its checks and queue publisher
    pub fn new(
        rbl: RblClient<R>,
        hostname: HostnameVerifier<R>,
        recipient: RecipientClient,
        greylist: GreylistClient,
        queue: Q,
    ) -> Self {
        Self {
            rbl,
            hostname,
            recipient,
            greylist,
            queue,
        }
    }

    /// Hook: connection opened
    ///
    /// Pure delegation to the reputation check.
    pub async fn validate_connection(&self, session: &mut Session) -> Verdict {
        if session.state() != SessionState::Open {
            return bad_sequence("validate_connection", session.state());
        }

        let verdict = self.rbl.check(session.context.remote_addr).await;
        session.apply(verdict, SessionState::ConnectionChecked)
    }

    /// Hook: sender declared (MAIL FROM)
    ///
    /// Delegates to the hostname authentication; on acceptance the sender
    /// is recorded in the envelope.
    pub async fn validate_sender(
        &self,
        session: &mut Session,
        from: Option<EmailAddress>,
    ) -> Verdict {
        if session.state() != SessionState::ConnectionChecked {
            return bad_sequence("validate_sender", session.state());
        }

        let verdict = self
            .hostname
            .verify(
                session.context.host_name_appears_as.as_deref(),
                session.context.client_hostname.as_deref(),
                session.context.remote_addr,
            )
            .await;

        if verdict.is_accepted() {
            session.context.envelope.from = from;
        }
        session.apply(verdict, SessionState::SenderChecked)
    }

    /// Hook: recipient declared (RCPT TO)
    ///
    /// Directory check first; the greylist only sees recipients the
    /// directory accepted, so addresses that would be rejected anyway are
    /// never greylisted and the extra call is saved.
    pub async fn validate_recipient(&self, session: &mut Session, to: &EmailAddress) -> Verdict {
        if !matches!(
            session.state(),
            SessionState::SenderChecked | SessionState::RecipientChecked
        ) {
            return bad_sequence("validate_recipient", session.state());
        }

        let verdict = self.recipient.check(to).await;
        if !verdict.is_accepted() {
            return session.apply(verdict, SessionState::RecipientChecked);
        }

        let triplet = Triplet::derive(&session.context, to);
        let verdict = self.greylist.check(&triplet).await;
        if verdict.is_accepted() {
            session.context.envelope.to.push(to.clone());
        }
        session.apply(verdict, SessionState::RecipientChecked)
    }

    /// Hook: message complete
    ///
    /// Stamps the completion timestamp and hands the context to the queue
    /// publisher, exactly once per session.
    pub async fn mail_ready(&self, session: &mut Session) -> Verdict {
        if session.state() != SessionState::RecipientChecked {
            return bad_sequence("mail_ready", session.state());
        }

        session.context.date = Some(Utc::now());
        info!(context = ?session.context, "mail ready for process");

        let job = MailJob::process_mail(session.context.clone());
        match self.queue.publish(&job).await {
            Ok(_) => session.apply(Verdict::Accepted, SessionState::Published),
            Err(e) => {
                error!(error = %e, "failed to publish mail-processing job");
                session.apply(
                    Verdict::defer(451, "Temporary queue failure, try again later"),
                    SessionState::Aborted,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::testing::MockResolver;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use mailward_common::types::FailurePolicy;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IP: &str = "203.0.113.5";
    const HOST: &str = "mail.example.com";

    #[derive(Default)]
    struct MemoryQueue {
        jobs: Mutex<Vec<MailJob>>,
    }

    #[async_trait]
    impl JobQueue for MemoryQueue {
        async fn publish(&self, job: &MailJob) -> Result<Uuid> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(Uuid::now_v7())
        }
    }

    struct FailingQueue;

    #[async_trait]
    impl JobQueue for FailingQueue {
        async fn publish(&self, _job: &MailJob) -> Result<Uuid> {
            Err(anyhow!("connection refused"))
        }
    }

    fn clean_resolver() -> MockResolver {
        // Forward confirmation succeeds; the reputation zone has no entry
        MockResolver::default().with_a(HOST, vec![IP.parse().unwrap()])
    }

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap()
    }

    async fn policy_services(recipient_ok: bool, greylist_ok: bool) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check-recipient"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": recipient_ok})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/greylist"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": greylist_ok})),
            )
            .mount(&server)
            .await;
        server
    }

    fn pipeline<Q: JobQueue>(
        resolver: MockResolver,
        server_uri: &str,
        queue: Q,
    ) -> Pipeline<MockResolver, Q> {
        let resolver = Arc::new(resolver);
        let http = http_client();
        Pipeline::new(
            RblClient::new(
                resolver.clone(),
                "zen.spamhaus.org",
                FailurePolicy::AcceptOpen,
            ),
            HostnameVerifier::new(resolver),
            RecipientClient::new(
                http.clone(),
                format!("{}/check-recipient", server_uri),
                "s3cret",
                FailurePolicy::AcceptOpen,
            ),
            GreylistClient::new(
                http,
                format!("{}/greylist", server_uri),
                "s3cret",
                FailurePolicy::AcceptOpen,
            ),
            queue,
        )
    }

    fn fresh_session() -> Session {
        let mut session = Session::new(IP.parse().unwrap());
        session.context.host_name_appears_as = Some(HOST.to_string());
        session.context.client_hostname = Some(HOST.to_string());
        session
    }

    fn sender() -> Option<EmailAddress> {
        EmailAddress::parse("sender@example.com")
    }

    fn recipient() -> EmailAddress {
        EmailAddress::parse("user@local.test").unwrap()
    }

    #[tokio::test]
    async fn test_clean_session_publishes_one_job() {
        let server = policy_services(true, true).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();

        assert!(pipeline.validate_connection(&mut session).await.is_accepted());
        assert!(pipeline
            .validate_sender(&mut session, sender())
            .await
            .is_accepted());
        assert!(pipeline
            .validate_recipient(&mut session, &recipient())
            .await
            .is_accepted());
        assert!(pipeline.mail_ready(&mut session).await.is_accepted());

        assert_eq!(session.state(), SessionState::Published);
        assert!(session.context.date.is_some());

        let jobs = pipeline.queue.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, "process_mail");
        assert_eq!(jobs[0].context.envelope.to, vec![recipient()]);
        assert_eq!(jobs[0].context.envelope.from, sender());
    }

    #[tokio::test]
    async fn test_multiple_recipients_accumulate() {
        let server = policy_services(true, true).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();

        pipeline.validate_connection(&mut session).await;
        pipeline.validate_sender(&mut session, sender()).await;

        let second = EmailAddress::parse("other@local.test").unwrap();
        pipeline.validate_recipient(&mut session, &recipient()).await;
        pipeline.validate_recipient(&mut session, &second).await;
        pipeline.mail_ready(&mut session).await;

        let jobs = pipeline.queue.jobs.lock().unwrap();
        assert_eq!(jobs[0].context.envelope.to, vec![recipient(), second]);
    }

    #[tokio::test]
    async fn test_blacklisted_connection_rejected_530() {
        let resolver = clean_resolver().with_a(
            "5.113.0.203.zen.spamhaus.org",
            vec!["127.0.0.2".parse().unwrap()],
        );
        let server = policy_services(true, true).await;
        let pipeline = pipeline(resolver, &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();

        let verdict = pipeline.validate_connection(&mut session).await;
        assert_eq!(verdict.code(), Some(530));
        assert_eq!(session.state(), SessionState::Aborted);

        // Later hooks answer 503 and nothing is ever published
        let verdict = pipeline.validate_sender(&mut session, sender()).await;
        assert_eq!(verdict.code(), Some(503));
        let verdict = pipeline.mail_ready(&mut session).await;
        assert_eq!(verdict.code(), Some(503));
        assert!(pipeline.queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_recipient_never_reaches_greylist() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check-recipient"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/greylist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();
        pipeline.validate_connection(&mut session).await;
        pipeline.validate_sender(&mut session, sender()).await;

        let verdict = pipeline.validate_recipient(&mut session, &recipient()).await;
        assert_eq!(verdict.code(), Some(550));
        assert_eq!(session.state(), SessionState::Aborted);

        server.verify().await;
    }

    #[tokio::test]
    async fn test_greylisted_recipient_deferred_451() {
        let server = policy_services(true, false).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();

        pipeline.validate_connection(&mut session).await;
        pipeline.validate_sender(&mut session, sender()).await;

        let verdict = pipeline.validate_recipient(&mut session, &recipient()).await;
        assert_eq!(verdict.code(), Some(451));
        assert!(matches!(verdict, Verdict::Deferred { .. }));
        assert!(session.context.envelope.to.is_empty());

        let verdict = pipeline.mail_ready(&mut session).await;
        assert_eq!(verdict.code(), Some(503));
        assert!(pipeline.queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_hostname_rejects_sender() {
        let server = policy_services(true, true).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());

        let mut session = Session::new(IP.parse().unwrap());
        session.context.host_name_appears_as = Some("localhost".to_string());
        session.context.client_hostname = Some("localhost".to_string());

        pipeline.validate_connection(&mut session).await;
        let verdict = pipeline.validate_sender(&mut session, sender()).await;
        assert_eq!(verdict.code(), Some(530));
        assert!(session.context.envelope.from.is_none());
    }

    #[tokio::test]
    async fn test_hooks_out_of_order_answer_503() {
        let server = policy_services(true, true).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();

        // MAIL before the connection was checked
        let verdict = pipeline.validate_sender(&mut session, sender()).await;
        assert_eq!(verdict.code(), Some(503));
        assert_eq!(session.state(), SessionState::Open);

        // DATA before any recipient
        let verdict = pipeline.mail_ready(&mut session).await;
        assert_eq!(verdict.code(), Some(503));
        assert!(pipeline.queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mail_ready_publishes_at_most_once() {
        let server = policy_services(true, true).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), MemoryQueue::default());
        let mut session = fresh_session();

        pipeline.validate_connection(&mut session).await;
        pipeline.validate_sender(&mut session, sender()).await;
        pipeline.validate_recipient(&mut session, &recipient()).await;
        pipeline.mail_ready(&mut session).await;

        let verdict = pipeline.mail_ready(&mut session).await;
        assert_eq!(verdict.code(), Some(503));
        assert_eq!(pipeline.queue.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_failure_defers_451() {
        let server = policy_services(true, true).await;
        let pipeline = pipeline(clean_resolver(), &server.uri(), FailingQueue);
        let mut session = fresh_session();

        pipeline.validate_connection(&mut session).await;
        pipeline.validate_sender(&mut session, sender()).await;
        pipeline.validate_recipient(&mut session, &recipient()).await;

        let verdict = pipeline.mail_ready(&mut session).await;
        assert_eq!(verdict.code(), Some(451));
        assert_eq!(session.state(), SessionState::Aborted);
    }
}
