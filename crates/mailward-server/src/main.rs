//! Mailward - Inbound SMTP admission entry point

mod engine;

use anyhow::{anyhow, Result};
use engine::InboundHandler;
use mailin_embedded::{Server, SslConfig};
use mailward_common::config::Config;
use mailward_core::{
    GreylistClient, HostnameVerifier, PgJobQueue, Pipeline, RblClient, RecipientClient,
    SystemResolver,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    init_logging();

    info!("Starting Mailward inbound SMTP...");

    let config = Config::load()?;

    // The engine runs sessions on plain threads; the pipeline runs on this
    // runtime and is reached through its handle.
    let runtime = tokio::runtime::Runtime::new()?;

    let resolver = Arc::new(SystemResolver::new());
    let pipeline = Arc::new(runtime.block_on(build_pipeline(&config, resolver.clone()))?);

    let handler = InboundHandler::new(
        pipeline,
        resolver,
        runtime.handle().clone(),
        config.smtp.max_message_size,
    );

    let mut server = Server::new(handler);
    server
        .with_name(config.server.hostname.clone())
        .with_ssl(SslConfig::None)
        .map_err(|e| anyhow!("TLS setup failed: {}", e))?
        .with_addr(config.server.bind_address.clone())
        .map_err(|e| anyhow!("Failed to bind {}: {}", config.server.bind_address, e))?;

    info!(
        "Listening for incoming SMTP on {}",
        config.server.bind_address
    );

    server.serve().map_err(|e| anyhow!("SMTP engine: {}", e))?;

    Ok(())
}

/// Construct the pipeline from configuration
async fn build_pipeline(
    config: &Config,
    resolver: Arc<SystemResolver>,
) -> Result<Pipeline<SystemResolver, PgJobQueue>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    info!("Database connection established");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.policy.timeout_secs))
        .build()?;

    Ok(Pipeline::new(
        RblClient::new(
            resolver.clone(),
            config.rbl.zone.clone(),
            config.rbl.on_unavailable,
        ),
        HostnameVerifier::new(resolver),
        RecipientClient::new(
            http.clone(),
            config.policy.recipient_url.clone(),
            config.policy.remote_secret.clone(),
            config.policy.recipient_on_unavailable,
        ),
        GreylistClient::new(
            http,
            config.policy.greylist_url.clone(),
            config.policy.remote_secret.clone(),
            config.policy.greylist_on_unavailable,
        ),
        PgJobQueue::new(pool, config.queue.name.clone(), config.queue.max_attempts),
    ))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailward=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
