// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use workorder_auth::{
    api::router, config::AppConfig, init_tracing, state::AppState, storage::AuthDatabase,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().expect("Invalid configuration");
    init_tracing(config.json_logs);

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    let db = AuthDatabase::open(&config.database_path()).expect("Failed to open auth database");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");
    let tls = config.tls.clone();

    tracing::info!(
        environment = %config.environment,
        dev_auth = config.dev_auth_enabled,
        oauth = config.oauth.is_some(),
        roles = config.roles.roles().len(),
        "configuration loaded"
    );
    if config.dev_auth_enabled {
        tracing::warn!("local development sign-in is enabled");
    }

    let state = AppState::new(config, db).expect("Failed to initialise identity provider");
    let seeded = state
        .seed_dev_identities()
        .expect("Failed to provision development identities");
    if seeded > 0 {
        tracing::info!(count = seeded, "development identities provisioned");
    }

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    match tls {
        Some(paths) => {
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                .await
                .expect("Failed to load TLS certificate");
            tracing::info!(%addr, "listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
                .expect("HTTPS server failed");
        }
        None => {
            tracing::info!(%addr, "listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app)
                .await
                .expect("HTTP server failed");
        }
    }
    tracing::info!("server stopped");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
