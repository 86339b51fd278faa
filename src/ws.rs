//! dashboard session over websocket
//!
//! on connect the session gets `sensor_update` then `action_log_update`,
//! after that every event the relay publishes. a client may send
//! `request_status_update` at any time to get the pair again.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};

use crate::broadcast::Delivery;
use crate::domain::{ActionLogEntry, Event, LiveState};
use crate::relay::Relay;

pub async fn ws_handler(State(relay): State<Relay>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| session_loop(relay, socket))
}

/// what a client frame asks for
#[derive(Debug, PartialEq)]
enum ClientRequest {
    StatusUpdate,
    Unknown,
}

fn parse_client_frame(text: &str) -> ClientRequest {
    let text = text.trim();
    if text == "request_status_update" {
        return ClientRequest::StatusUpdate;
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) if v.get("event").and_then(|e| e.as_str()) == Some("request_status_update") => {
            ClientRequest::StatusUpdate
        }
        _ => ClientRequest::Unknown,
    }
}

fn initial_frames(snapshot: LiveState, log: Vec<ActionLogEntry>) -> [Event; 2] {
    [Event::SensorUpdate(snapshot), Event::ActionLogUpdate(log)]
}

/// false once the client is gone
async fn send_event(socket: &mut WebSocket, event: &Event) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(event = event.name(), "failed to encode event: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(text)).await.is_ok()
}

async fn send_all(socket: &mut WebSocket, events: &[Event]) -> bool {
    for event in events {
        if !send_event(socket, event).await {
            return false;
        }
    }
    true
}

async fn session_loop(relay: Relay, mut socket: WebSocket) {
    let connected = relay.connect().await;
    let mut subscription = connected.subscription;
    tracing::info!(sessions = relay.session_count(), "dashboard connected");

    if send_all(&mut socket, &initial_frames(connected.snapshot, connected.action_log)).await {
        loop {
            tokio::select! {
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if parse_client_frame(&text) == ClientRequest::StatusUpdate {
                                let (snapshot, log) = relay.status().await;
                                if !send_all(&mut socket, &initial_frames(snapshot, log)).await {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!("dashboard socket error: {}", e);
                            break;
                        }
                        // ping/pong are answered by axum, binary is ignored
                        Some(Ok(_)) => {}
                    }
                }
                delivery = subscription.next() => {
                    match delivery {
                        Delivery::Event(event) => {
                            if !send_event(&mut socket, &event).await {
                                break;
                            }
                        }
                        Delivery::Lagged(n) => {
                            tracing::warn!(dropped = n, "dashboard too slow, dropped oldest events");
                        }
                        Delivery::Closed => break,
                    }
                }
            }
        }
    }

    drop(subscription);
    let _ = socket.close().await;
    tracing::info!(sessions = relay.session_count(), "dashboard disconnected");
}
