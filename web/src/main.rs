//! Passkey identity provider server.
//!
//! Reads configuration from the environment (and `.env`), connects to Redis
//! and serves until Ctrl+C or SIGTERM.

use anyhow::Context;
use passkey_idp_auth::audit::TracingAuditSink;
use passkey_idp_auth::stores::{RedisKeyValueStore, RedisRateLimiter};
use passkey_idp_auth::webauthn::PasskeyVerifier;
use passkey_idp_auth::IdentityProvider;
use passkey_idp_web::{build_router, AppState, RedisBackend, ServerConfig};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passkey_idp_web=info,passkey_idp_auth=info,audit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting passkey identity provider");

    let config = ServerConfig::from_env().context("loading configuration")?;
    info!(
        issuer = %config.idp.issuer,
        bind_addr = %config.bind_addr,
        env = ?config.env,
        audit = config.audit_enabled,
        trusted_proxies = config.trusted_proxies.len(),
        "Configuration loaded"
    );

    let signing_key = config.load_signing_key()?;
    let previous_keys = config.load_previous_keys()?;

    info!("Connecting to Redis...");
    let kv = RedisKeyValueStore::new(&config.redis_url)
        .await
        .context("connecting to Redis")?;
    let limiter = RedisRateLimiter::from_connection_manager(kv.connection_manager());
    info!("Redis connected");

    let idp = IdentityProvider::new(
        kv,
        PasskeyVerifier::new(),
        TracingAuditSink::new(config.audit_enabled),
        Some(limiter),
        signing_key,
        config.idp.clone(),
    );
    for key in previous_keys {
        idp.oauth.tokens().retire(key)?;
    }

    let state = AppState::new(idp).with_trusted_proxies(config.trusted_proxies.clone());
    let app = build_router::<RedisBackend>(state, config.is_production());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(address = %config.bind_addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
