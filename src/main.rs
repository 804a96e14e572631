use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use troupe::{
    config::Settings,
    integrations::{webhook::WebhookIntegration, IntegrationManager},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "troupe=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting billing clock: sweep every {}s, timeout {}s",
        settings.billing.sweep_interval_secs,
        settings.billing.sweep_timeout_secs
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Register notification collaborators
    let integration_manager = Arc::new(IntegrationManager::new());
    if let Some(webhook) = WebhookIntegration::new(settings.notifications.webhook.clone()) {
        integration_manager.register(Arc::new(webhook)).await;
    }

    // Check integration health
    let health_results = integration_manager.health_check_all().await;
    for (name, result) in health_results {
        match result {
            Ok(_) => tracing::info!("Integration {} is healthy", name),
            Err(e) => tracing::warn!("Integration {} health check failed: {:?}", name, e),
        }
    }

    let context = Arc::new(ServiceContext::new(db_pool, integration_manager));

    let mut ticker =
        tokio::time::interval(Duration::from_secs(settings.billing.sweep_interval_secs));
    let sweep_timeout = Duration::from_secs(settings.billing.sweep_timeout_secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&context, sweep_timeout).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down billing clock");
                break;
            }
        }
    }

    Ok(())
}

/// One scheduled pass: the billing sweep under its wall-clock budget, then
/// payment expiry. Request-driven operations run elsewhere; this loop only
/// ever advances clocks.
async fn run_tick(context: &ServiceContext, sweep_timeout: Duration) {
    let now = Utc::now();

    match tokio::time::timeout(sweep_timeout, context.billing_service.sweep(now)).await {
        Ok(Ok(report)) => {
            if !report.failures.is_empty() {
                tracing::warn!(
                    "Sweep finished with {} per-club failures",
                    report.failures.len()
                );
            }
        }
        Ok(Err(e)) => tracing::error!("Sweep failed: {}", e),
        Err(_) => tracing::error!("Sweep exceeded its {}s budget", sweep_timeout.as_secs()),
    }

    if let Err(e) = context.payment_service.expire_pending(now).await {
        tracing::error!("Payment expiry failed: {}", e);
    }
}
