//! Queue publisher
//!
//! At most one job per completed session: the full connection context is
//! serialized and handed to downstream mail processing. Retry and backoff
//! of the job itself belong to the queue's consumers, not to this
//! pipeline.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mailward_common::types::ConnectionContext;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Job type tag identifying mail-processing work
pub const JOB_TYPE_PROCESS_MAIL: &str = "process_mail";

/// Job payload published for a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailJob {
    /// Job type tag
    pub job_type: String,

    /// Accumulated connection context, including the envelope
    pub context: ConnectionContext,
}

impl MailJob {
    /// Wrap a completed context as mail-processing work
    pub fn process_mail(context: ConnectionContext) -> Self {
        Self {
            job_type: JOB_TYPE_PROCESS_MAIL.to_string(),
            context,
        }
    }
}

/// Outbound job queue used at the end of a session
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish one job; returns its identifier
    async fn publish(&self, job: &MailJob) -> Result<Uuid>;
}

/// Job queue backed by a Postgres jobs table
pub struct PgJobQueue {
    pool: PgPool,
    queue: String,
    max_attempts: i32,
}

impl PgJobQueue {
    /// Create a new queue publisher
    pub fn new(pool: PgPool, queue: impl Into<String>, max_attempts: i32) -> Self {
        Self {
            pool,
            queue: queue.into(),
            max_attempts,
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn publish(&self, job: &MailJob) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let payload = serde_json::to_value(job)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, payload, status, attempts, max_attempts, scheduled_at, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6)
            "#,
        )
        .bind(job_id)
        .bind(&self.queue)
        .bind(&payload)
        .bind(self.max_attempts)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(%job_id, queue = %self.queue, "published mail-processing job");
        Ok(job_id)
    }
}
