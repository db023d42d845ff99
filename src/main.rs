// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use apigw_jwt_auth::{
    api::router,
    auth::AuthFilter,
    config::{LogFormat, Settings},
    keystore::{KeyRefresher, KeyStore},
    state::AppState,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let settings = Settings::from_env().expect("Invalid configuration");
    init_tracing(settings.log_format);

    let key_store = KeyStore::from_config(&settings.key_store).expect("Failed to open key store");
    info!(
        key_store = %key_store.variant(),
        gateway_name = %settings.auth.gateway_name,
        "Key store ready"
    );
    if settings.auth.exemption_enabled {
        warn!("Token verification is disabled; every request is served anonymously");
    }

    // Background key refresh (only when the gateway API is configured)
    let shutdown = CancellationToken::new();
    let refresher = match settings.refresh.clone() {
        Some(config) => {
            let refresher =
                KeyRefresher::new(config, key_store.clone()).expect("Failed to build key refresher");
            Some(tokio::spawn(refresher.run(shutdown.clone())))
        }
        None => {
            info!("Gateway API not configured; public key refresh disabled");
            None
        }
    };

    let state = AppState::new(AuthFilter::new(settings.auth.clone(), key_store));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    info!(%addr, "apigw-jwt-auth listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    if let Some(handle) = refresher {
        join_refresher(handle).await;
    }
}

/// Wait for the refresher task; a panic inside it is logged, not dropped.
async fn join_refresher(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, panicked = e.is_panic(), "Public key refresher task failed");
            false
        }
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
