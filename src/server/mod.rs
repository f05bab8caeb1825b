//! HTTP and WebSocket surface for remote consumers.
//!
//! `GET /api/status` serves the current snapshot; `GET /ws` sends the
//! snapshot once and then streams every watcher event. The bounded
//! subscription isolates slow sockets: they lose events, the watcher never
//! waits for them.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::{debug, info};

use crate::watcher::Watcher;

pub fn router(watcher: Arc<Watcher>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/ws", get(ws_upgrade))
        .with_state(watcher)
}

pub async fn serve(watcher: Arc<Watcher>, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "API server listening");
    axum::serve(listener, router(watcher))
        .await
        .context("serving API")
}

fn status_body(watcher: &Watcher) -> serde_json::Value {
    serde_json::json!({
        "accounts": watcher.get_accounts(),
        "prices": watcher.get_prices(),
    })
}

async fn status(State(watcher): State<Arc<Watcher>>) -> Json<serde_json::Value> {
    Json(status_body(&watcher))
}

async fn ws_upgrade(
    State(watcher): State<Arc<Watcher>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, watcher))
}

async fn handle_socket(mut socket: WebSocket, watcher: Arc<Watcher>) {
    let initial = serde_json::json!({
        "type": "initial",
        "data": status_body(&watcher),
    });
    if socket.send(Message::Text(initial.to_string())).await.is_err() {
        return;
    }

    let mut subscription = watcher.subscribe();
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    debug!("websocket client went away");
                    break;
                }
            }
            incoming = socket.recv() => {
                // Clients only ever read; any close or error ends the session.
                match incoming {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
    watcher.unsubscribe(subscription);
}
