//! Customer identity resolution.
//!
//! Contacts that share an email or phone number are merged into one identity
//! cluster rooted at its oldest primary contact. See [`identity`] for the
//! algorithm and [`db`] for the store it runs against.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod identity;
mod migrations;
pub mod state;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use state::AppState;

/// Load config, open the store and serve HTTP until Ctrl-C.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config()?;
    let addr: SocketAddr = config.bind_address.parse()?;

    let state = Arc::new(AppState::open(config)?);
    let app = http::router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("contact-identity listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!(
        "Shutting down; closing {} database connection(s)",
        state.pool_size()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
