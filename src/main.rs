//! Billhook service entrypoint.
//!
//! Wires the Postgres stores, the in-process job queue, and the HTTP
//! surface together, then serves until shutdown. On shutdown the listener
//! stops first and the queue drains before the process exits, so accepted
//! events are not abandoned mid-processing.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billhook::adapters::http::{webhook_router, WebhookAppState};
use billhook::adapters::postgres::{PostgresBillingStore, PostgresEventStore};
use billhook::adapters::queue::InProcessJobQueue;
use billhook::application::handlers::webhook::ProcessEventHandler;
use billhook::config::AppConfig;
use billhook::domain::webhook::WebhookVerifier;
use billhook::ports::{BillingStore, JobQueue, WebhookEventStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.server.log_level)
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        environment = ?config.server.environment,
        "starting billhook"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let event_store: Arc<dyn WebhookEventStore> =
        Arc::new(PostgresEventStore::new(pool.clone()));
    let billing_store: Arc<dyn BillingStore> = Arc::new(PostgresBillingStore::new(pool.clone()));
    let verifier = Arc::new(WebhookVerifier::new(
        config.provider.webhook_secret.clone(),
    ));

    let queue = Arc::new(InProcessJobQueue::new(config.queue.to_queue_config()));
    let processor = Arc::new(ProcessEventHandler::new(
        billing_store,
        event_store.clone(),
    ));
    queue.start(processor);

    let state = WebhookAppState {
        verifier,
        event_store,
        queue: queue.clone() as Arc<dyn JobQueue>,
    };
    let app = webhook_router(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, draining job queue");
    queue.close().await;
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
    }
}
