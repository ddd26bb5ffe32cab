//! HTTP routes exposed by the relay

use log::debug;
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::watch;
use warp::{Filter, Rejection, Reply};

use crate::constants::{HEALTH_PATH, WS_PATH};
use crate::core::registry::SharedRegistry;
use crate::handlers::websocket::{handle_ws_client, ConnectionSettings};

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    connections: usize,
}

/// WebSocket upgrade on `/ws` and `/`, plus `GET /health`
pub fn routes(
    registry: SharedRegistry,
    settings: ConnectionSettings,
    shutdown: watch::Receiver<bool>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health_route = warp::path(HEALTH_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_registry(registry.clone()))
        .map(|registry: SharedRegistry| {
            warp::reply::json(&HealthStatus {
                status: "ok",
                connections: registry.len(),
            })
        });

    let ws_route = warp::path(WS_PATH)
        .and(warp::path::end())
        .or(warp::path::end())
        .unify()
        .and(warp::ws())
        .and(with_registry(registry))
        .and(warp::any().map(move || settings))
        .and(warp::any().map(move || shutdown.clone()))
        .map(
            |ws: warp::ws::Ws,
             registry: SharedRegistry,
             settings: ConnectionSettings,
             shutdown: watch::Receiver<bool>| {
                debug!("New websocket connection");
                ws.on_upgrade(move |socket| handle_ws_client(socket, registry, settings, shutdown))
            },
        );

    health_route.or(ws_route)
}

// Helper function to include the registry in request handlers
fn with_registry(
    registry: SharedRegistry,
) -> impl Filter<Extract = (SharedRegistry,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}
