//! SMTP engine boundary
//!
//! `mailin-embedded` owns the SMTP grammar, command sequencing, and
//! session I/O; this adapter maps its callbacks onto the four pipeline
//! hooks and decodes each [`Verdict`] into a protocol status line. It also
//! performs the engine-side reverse DNS that supplies `client_hostname`.
//!
//! The engine runs sessions on plain threads, so each hook bridges into
//! the async pipeline through a runtime handle. The handler is cloned per
//! connection, which gives every session its own state; if the client
//! drops the connection mid-check the session thread unwinds and the
//! in-flight verdict is discarded.

use mailin_embedded::response::OK;
use mailin_embedded::{Handler, Response};
use mailward_common::types::{EmailAddress, Verdict};
use mailward_core::{DnsResolver, Pipeline, PgJobQueue, Session, SystemResolver};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

type InboundPipeline = Pipeline<SystemResolver, PgJobQueue>;

/// Decode a pipeline verdict into an engine response
fn to_response(verdict: Verdict) -> Response {
    match verdict {
        Verdict::Accepted => OK,
        Verdict::Rejected { code, message } | Verdict::Deferred { code, message } => {
            Response::custom(code, message)
        }
    }
}

/// Engine handler wiring one SMTP session to the admission pipeline
#[derive(Clone)]
pub struct InboundHandler {
    pipeline: Arc<InboundPipeline>,
    resolver: Arc<SystemResolver>,
    runtime: tokio::runtime::Handle,
    max_message_size: usize,
    session: Option<Session>,
    data_size: usize,
}

impl InboundHandler {
    /// Create the handler passed to the engine
    pub fn new(
        pipeline: Arc<InboundPipeline>,
        resolver: Arc<SystemResolver>,
        runtime: tokio::runtime::Handle,
        max_message_size: usize,
    ) -> Self {
        Self {
            pipeline,
            resolver,
            runtime,
            max_message_size,
            session: None,
            data_size: 0,
        }
    }
}

impl Handler for InboundHandler {
    fn helo(&mut self, ip: IpAddr, domain: &str) -> Response {
        let mut session = Session::new(ip);
        session.context.host_name_appears_as = Some(domain.to_string());

        // Engine-side reverse lookup; the pipeline only re-verifies the
        // forward direction.
        session.context.client_hostname = self
            .runtime
            .block_on(self.resolver.reverse_lookup(ip))
            .ok()
            .and_then(|mut names| {
                if names.is_empty() {
                    None
                } else {
                    Some(names.remove(0))
                }
            });
        debug!(%ip, domain, client_hostname = ?session.context.client_hostname, "session opened");

        let verdict = self
            .runtime
            .block_on(self.pipeline.validate_connection(&mut session));
        self.session = Some(session);
        self.data_size = 0;
        to_response(verdict)
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, from: &str) -> Response {
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => {
                warn!("MAIL before HELO reached the pipeline adapter");
                return Response::custom(503, "Bad sequence of commands".to_string());
            }
        };

        // An empty reverse-path (bounce) carries no sender address
        let sender = EmailAddress::parse(from);
        let verdict = self
            .runtime
            .block_on(self.pipeline.validate_sender(session, sender));
        to_response(verdict)
    }

    fn rcpt(&mut self, to: &str) -> Response {
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => return Response::custom(503, "Bad sequence of commands".to_string()),
        };

        let recipient = match EmailAddress::parse(to) {
            Some(r) => r,
            None => return Response::custom(501, "Bad recipient address syntax".to_string()),
        };

        let verdict = self
            .runtime
            .block_on(self.pipeline.validate_recipient(session, &recipient));
        to_response(verdict)
    }

    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        // The message body is not parsed here; only the size limit is
        // enforced. Downstream processing reads the stored message.
        self.data_size += buf.len();
        Ok(())
    }

    fn data_end(&mut self) -> Response {
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => return Response::custom(503, "Bad sequence of commands".to_string()),
        };

        if self.data_size > self.max_message_size {
            warn!(
                size = self.data_size,
                limit = self.max_message_size,
                "message exceeds size limit"
            );
            return Response::custom(552, "Message exceeds maximum size".to_string());
        }

        let verdict = self.runtime.block_on(self.pipeline.mail_ready(session));
        to_response(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verdict_decoding() {
        assert_eq!(to_response(Verdict::Accepted).code, OK.code);
        assert_eq!(
            to_response(Verdict::reject(530, "Invalid Hostname")).code,
            530
        );
        assert_eq!(
            to_response(Verdict::defer(451, "Greylisted: Please try again later")).code,
            451
        );
    }
}
