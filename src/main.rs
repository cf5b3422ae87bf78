//! WAF Sessionizer binary
//!
//! Runs the sessionizing pipeline once, or every `RUN_INTERVAL_SECS` seconds.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waf_sessionizer::config::Config;
use waf_sessionizer::db;
use waf_sessionizer::handlers::{self, AppState};
use waf_sessionizer::logic::classifier::HttpClassifier;
use waf_sessionizer::logic::{run_forever, PgStore, SessionWindower, Sessionizer, SharedStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("WAF Sessionizer starting...");
    for warning in &config.warnings {
        tracing::warn!("{}", warning);
    }

    let classifier = HttpClassifier::new(config.classifier_config(), config.label_policy.clone())
        .context("Failed to build classifier client")?;

    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    let pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to create database pool")?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let store = Arc::new(PgStore::new(pool));

    tracing::info!(
        classifier = classifier.endpoint(),
        guard = config.use_any_hit_guard,
        inactivity_minutes = config.inactivity_minutes,
        batch_size = config.batch_size,
        "Pipeline configured"
    );

    let windower = SessionWindower::new(
        config.inactivity_window(),
        config.guard_policy(),
        Arc::new(classifier),
        store.clone(),
    );
    let sessionizer = Sessionizer::new(store, windower, config.batch_size);
    let status: SharedStatus = Arc::default();

    if let Some(port) = config.status_port {
        let app = handlers::create_router(AppState {
            status: status.clone(),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status port {port}"))?;

        tracing::info!("Status endpoint listening on http://{}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Status server stopped");
            }
        });
    }

    match config.run_interval() {
        None => {
            let result = sessionizer.run_once().await;
            status.write().record(&result);
            result?;
        }
        Some(interval) => {
            tracing::info!(interval_secs = interval.as_secs(), "Watch mode");
            run_forever(&sessionizer, interval, status, shutdown_signal()).await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
