// Fake Pub/Sub REST endpoint shared by the integration tests
#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use warp::http::StatusCode;
use warp::Filter;

pub const PROJECT: &str = "demo";
pub const SUBSCRIPTION: &str = "rectangle-commands-sub";

#[derive(Default)]
pub struct FakeState {
    pub pending: VecDeque<(String, String)>, // (ack_id, base64 data)
    pub acked: Vec<String>,
    pub authorization: Vec<Option<String>>,
    pub fail_pulls: bool,
}

pub type SharedState = Arc<Mutex<FakeState>>;

// Start a minimal Pub/Sub REST endpoint on an ephemeral port
pub fn start_fake_pubsub(state: SharedState) -> SocketAddr {
    let post_state = state.clone();
    let post = warp::post()
        .and(warp::path!("v1" / "projects" / String / "subscriptions" / String))
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .map(move |project: String, resource: String, auth: Option<String>, body: Value| {
            let mut state = post_state.lock().unwrap();
            state.authorization.push(auth);

            if project != PROJECT {
                return warp::reply::with_status(
                    warp::reply::json(&json!({})),
                    StatusCode::NOT_FOUND,
                );
            }

            if resource == format!("{}:pull", SUBSCRIPTION) {
                if state.fail_pulls {
                    return warp::reply::with_status(
                        warp::reply::json(&json!({"error": {"message": "backend unavailable"}})),
                        StatusCode::SERVICE_UNAVAILABLE,
                    );
                }
                let max = body["maxMessages"].as_u64().unwrap_or(1) as usize;
                let count = max.min(state.pending.len());
                let received: Vec<Value> = state
                    .pending
                    .drain(..count)
                    .enumerate()
                    .map(|(i, (ack_id, data))| {
                        json!({
                            "ackId": ack_id,
                            "message": {
                                "data": data,
                                "messageId": format!("m{}", i),
                                "publishTime": "2024-05-01T12:00:00Z"
                            }
                        })
                    })
                    .collect();
                let reply = if received.is_empty() {
                    json!({})
                } else {
                    json!({ "receivedMessages": received })
                };
                return warp::reply::with_status(warp::reply::json(&reply), StatusCode::OK);
            }

            if resource == format!("{}:acknowledge", SUBSCRIPTION) {
                if let Some(ids) = body["ackIds"].as_array() {
                    state
                        .acked
                        .extend(ids.iter().filter_map(|id| id.as_str().map(String::from)));
                }
                return warp::reply::with_status(warp::reply::json(&json!({})), StatusCode::OK);
            }

            warp::reply::with_status(warp::reply::json(&json!({})), StatusCode::NOT_FOUND)
        });

    let get = warp::get()
        .and(warp::path!("v1" / "projects" / String / "subscriptions" / String))
        .map(|project: String, subscription: String| {
            if project == PROJECT && subscription == SUBSCRIPTION {
                warp::reply::with_status(
                    warp::reply::json(&json!({
                        "name": format!("projects/{}/subscriptions/{}", project, subscription)
                    })),
                    StatusCode::OK,
                )
            } else {
                warp::reply::with_status(
                    warp::reply::json(&json!({"error": {"message": "Resource not found"}})),
                    StatusCode::NOT_FOUND,
                )
            }
        });

    let (addr, serve) = warp::serve(post.or(get)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serve);
    addr
}

pub fn enqueue(state: &SharedState, ack_id: &str, payload: &str) {
    state
        .lock()
        .unwrap()
        .pending
        .push_back((ack_id.to_string(), STANDARD.encode(payload)));
}

// Queue data exactly as given, skipping the base64 wire encoding
pub fn enqueue_raw(state: &SharedState, ack_id: &str, data: &str) {
    state
        .lock()
        .unwrap()
        .pending
        .push_back((ack_id.to_string(), data.to_string()));
}
