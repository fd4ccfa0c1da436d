//! `storefront-payments serve`: starts the HTTP server.
//!
//! Reads the TOML configuration, seeds merchant credentials, builds the
//! provider client and payment service, then serves the router until a
//! shutdown signal arrives.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use tower_http::cors;

use crate::config::{Config, load_config};
use crate::credential::CredentialResolver;
use crate::provider::ProviderClient;
use crate::routes;
use crate::service::PaymentService;
use crate::signal::ShutdownSignal;
use crate::store::{CredentialStore, InMemoryStore, OrderStore};
use crate::telemetry::Telemetry;

/// Loads every `[merchants]` entry into the credential store.
async fn seed_merchants(
    config: &Config,
    credentials: Arc<dyn CredentialStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = CredentialResolver::new(credentials);
    for (merchant_id, seed) in &config.merchants {
        resolver.save(merchant_id, seed.resolve()?).await?;
    }
    if !config.merchants.is_empty() {
        tracing::info!(count = config.merchants.len(), "merchant credentials seeded");
    }
    Ok(())
}

/// Execute the `serve` command.
///
/// # Errors
///
/// Returns an error if configuration loading, merchant seeding, client
/// construction, or server binding fails.
///
/// # Panics
///
/// Panics if the rustls crypto provider cannot be installed.
#[allow(clippy::cognitive_complexity, clippy::future_not_send)]
pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("Failed to initialize rustls crypto provider");

    dotenv().ok();

    let telemetry = Telemetry::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).register();

    let config = load_config(config_path)?;

    let store = Arc::new(InMemoryStore::new());
    let orders: Arc<dyn OrderStore> = Arc::<InMemoryStore>::clone(&store);
    let credentials: Arc<dyn CredentialStore> = store;
    seed_merchants(&config, Arc::clone(&credentials)).await?;

    let provider = ProviderClient::new(&config.provider.base_url, config.provider.timeout())?;
    tracing::info!(base_url = %config.provider.base_url, "payment provider configured");

    let service = PaymentService::new(
        orders,
        credentials,
        Arc::new(provider),
        config.service_settings(),
    );

    let http_endpoints = Router::new()
        .merge(routes::routes().with_state(Arc::new(service)))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let shutdown = ShutdownSignal::listen()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(shutdown.triggered())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
