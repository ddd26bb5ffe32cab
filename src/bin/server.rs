use log::{debug, error, info};
use std::sync::Arc;

use command_relay::config::RelayConfig;
use command_relay::constants::WS_PATH;
use command_relay::core::{create_registry, QueuePoller};
use command_relay::handlers::ConnectionSettings;
use command_relay::queue::{MessageQueue, PubSubClient};
use command_relay::{server, shutdown};

#[tokio::main]
async fn main() {
    // Load .env before logging so it can carry RUST_LOG
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    };

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: listen={}, subscription={}, endpoint={}, batch_size={}, poll_interval={:?}",
        config.listen_addr(),
        config.subscription_path(),
        config.pubsub_endpoint,
        config.batch_size,
        config.poll_interval
    );

    // The queue must be reachable before we accept anyone
    let pubsub = match PubSubClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Pub/Sub client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pubsub.check_subscription().await {
        error!("Cannot reach subscription {}: {}", config.subscription_path(), e);
        std::process::exit(1);
    }
    let queue: Arc<dyn MessageQueue> = Arc::new(pubsub);

    let registry = create_registry();
    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    tokio::spawn(async move {
        shutdown::listen_for_signals().await;
        let _ = shutdown_tx.send(true);
    });

    // Start draining the queue
    let poller = QueuePoller::from_config(&config, queue, registry.clone());
    let poller_shutdown = shutdown_rx.clone();
    let poller_handle = tokio::spawn(async move { poller.run(poller_shutdown).await });

    let routes = server::routes(
        registry.clone(),
        ConnectionSettings::from_config(&config),
        shutdown_rx.clone(),
    );

    let addr = match config.resolve_listen_addr().await {
        Ok(addr) => addr,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let (bound_addr, server) = match warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, shutdown::wait_for_shutdown(shutdown_rx.clone()))
    {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Command relay listening on ws://{}/{}", bound_addr, WS_PATH);
    server.await;

    info!("Listener closed, stopping queue poller");
    if let Err(e) = poller_handle.await {
        error!("Queue poller task failed: {}", e);
    }

    shutdown::wait_for_drain(&registry, config.shutdown_grace).await;
    info!("Command relay stopped");
}
