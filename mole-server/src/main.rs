//! mole-server - Ticket broker for tunnel operations.
//!
//! Authenticates users by password, hands out address-bound tickets and
//! checks them on privileged requests.

mod api;
mod config;
mod credentials;
mod peer;

use anyhow::{Context, Result};
use clap::Parser;
use config::ServerConfig;
use mole_core::{KeyState, TicketAuthority};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = ServerConfig::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if config.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting mole-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Ticket lifetime: {}s", config.ticket_lifetime);

    // Without a secret nothing can be issued or verified safely
    let keys = KeyState::new().context("Failed to generate ticket key")?;
    let authority = TicketAuthority::new(Arc::new(keys), config.ticket_lifetime());

    let credentials = credentials::Credentials::new(&config.all_users());
    if credentials.is_empty() {
        warn!("No users configured; no tickets can be issued. Use --user NAME:PASSWORD");
    } else {
        info!("Users configured: {}", credentials.len());
    }
    if config.admin_key.is_none() {
        info!("No admin key configured; re-initialization endpoint disabled");
    }
    for net in &config.trusted_proxies {
        info!("Trusting X-Forwarded-For from {}", net);
    }

    let state = api::ApiState::new(
        authority,
        credentials,
        peer::TrustedProxies::new(config.trusted_proxies.clone()),
        config.admin_key.clone(),
    );
    let app = api::create_api_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!("Listening on {}", config.listen);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down...");
    })
    .await?;

    Ok(())
}
