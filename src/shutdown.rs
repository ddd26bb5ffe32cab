//! Graceful shutdown coordination
//!
//! A single `watch` channel carries the shutdown flag. The poller, the
//! listener and every connection handler observe their own receiver.

use log::{info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::core::registry::ConnectionRegistry;

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Resolve once SIGINT or SIGTERM arrives
pub async fn listen_for_signals() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
}

/// Resolve once the flag is set or its sender is gone
pub async fn wait_for_shutdown(mut shutdown: ShutdownReceiver) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Wait until every connection has deregistered, at most `grace`.
/// Returns whether the registry drained in time.
pub async fn wait_for_drain(registry: &ConnectionRegistry, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while !registry.is_empty() {
        if Instant::now() >= deadline {
            warn!(
                "Shutdown grace period elapsed with {} connections still open",
                registry.len()
            );
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}
