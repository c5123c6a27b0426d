//! Docsift billing service entry point.
//!
//! Wires configuration, the Postgres pool, the Stripe gateway, and the
//! HTTP router, then serves until shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use docsift::adapters::http::billing::{billing_router, BillingAppState};
use docsift::adapters::postgres::{PostgresEntitlementStore, PostgresIntentLookup};
use docsift::adapters::stripe::{StripeConfig, StripeGateway};
use docsift::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "Starting docsift billing service"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let stripe_config = StripeConfig::new(
        config.payment.stripe_api_key.clone(),
        config.payment.stripe_webhook_secret.clone(),
    )
    .with_require_livemode(config.payment.require_livemode);

    let state = BillingAppState::new(
        Arc::new(PostgresEntitlementStore::new(pool.clone())),
        Arc::new(StripeGateway::new(stripe_config)),
        Arc::new(PostgresIntentLookup::new(pool)),
        Arc::new(config.payment.price_catalog()),
    );

    let cors = {
        let origins = config.server.cors_origins_list();
        if origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_headers(Any)
        } else {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_headers(Any)
        }
    };

    let app = Router::new()
        .nest("/api", billing_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
