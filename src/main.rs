//! mirror-voiced: voice session coordinator for smart-mirror displays
//!
//! This daemon sits between a wake detector, a voice-assistant client and
//! the mirror's display layer, and provides:
//! - Device registration with the companion authentication service
//! - One recording session at a time, opened by a wake trigger
//! - Endpointing: capture stops after a quiet period of low audio levels
//! - A configurable table mapping recognised command phrases to triggers
//!   or display notifications
//! - IPC server for triggers, audio levels, assistant outcomes and
//!   lifecycle notifications
//!
//! Wake-word matching, audio streaming and UI rendering live in the
//! processes connected over IPC.

mod commands;
mod config;
mod deferred;
mod endpoint;
mod events;
mod ipc;
mod lifecycle;
mod registration;
mod session;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::{BroadcastSink, MirrorEvent};
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::ShutdownSignal;
use crate::registration::{CompanionAuthenticator, RegistrationFlow};
use crate::session::{AssistantCommand, BridgedAssistant};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "mirror-voiced starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket = ?config.socket_path,
        companion = %config.companion_url,
        threshold = config.endpoint.threshold,
        quiet_ms = config.endpoint.quiet_period.as_millis() as u64,
        "configuration loaded"
    );

    // Install signal handlers before the (possibly slow) registration step
    let mut shutdown = ShutdownSignal::install().context("failed to register signal handlers")?;

    // Lifecycle events -> display subscribers
    let (event_tx, _) = broadcast::channel::<MirrorEvent>(64);
    // Assistant commands -> assistant peer
    let (command_tx, _) = broadcast::channel::<AssistantCommand>(64);

    let sink = BroadcastSink::new(event_tx);
    let bridge = Arc::new(BridgedAssistant::new(command_tx));

    // Registration must produce a code before any session can be opened
    let authenticator = Arc::new(CompanionAuthenticator::new(
        &config.companion_url,
        &config.product_id,
        &config.dsn,
    ));
    let registration = RegistrationFlow::begin(
        authenticator,
        bridge.clone(),
        Arc::new(sink.clone()),
        &config.companion_url,
    )
    .await
    .context("device registration failed")?;

    let coordinator = registration.coordinator(config.endpoint, Handle::current());

    let server = Server::new(
        &config.socket_path,
        ServerContext::new(
            coordinator.clone(),
            bridge,
            registration,
            config.commands,
            sink,
        ),
    )?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        reason = shutdown.wait() => {
            info!(%reason, "shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    coordinator.shutdown();
    server.shutdown().await;

    info!("mirror-voiced stopped");

    Ok(())
}
