//! ==============================================================================
//! server.rs - http/control api
//! ==============================================================================
//!
//! routes:
//!     GET  /                  dashboard page (static/index.html)
//!     GET  /ws                dashboard event channel (ws.rs)
//!     POST /ingest            device pushes a reading
//!     POST /control           operator turns the appliance on/off
//!     GET  /status            live snapshot + action log
//!     GET  /pending-commands  device drains its command queue
//!     GET  /readings          recent persisted readings
//!     GET  /healthz           store liveness
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::cors::CorsLayer;

use crate::domain::{ActionLogEntry, ControlAction, DeviceCommand, LiveState, NewReading, SensorReading};
use crate::error::{ApiError, ApiResult};
use crate::relay::Relay;
use crate::ws;

const DASHBOARD_HTML: &str = include_str!("../static/index.html");

const DEFAULT_READINGS: u32 = 50;
const MAX_READINGS: u32 = 500;

pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/ingest", post(ingest_handler))
        .route("/control", post(control_handler))
        .route("/status", get(status_handler))
        .route("/pending-commands", get(pending_commands_handler))
        .route("/readings", get(readings_handler))
        .route("/healthz", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(relay)
}

pub async fn run_server(relay: Relay, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ==============================================================================
// device ingest
// ==============================================================================

#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    snapshot: LiveState,
}

/// POST /ingest {current?, voltage?, motion_detected?}
async fn ingest_handler(State(relay): State<Relay>, body: Bytes) -> ApiResult<Json<IngestResponse>> {
    let reading = parse_reading(&body)?;
    let snapshot = relay.ingest(reading).await?;
    Ok(Json(IngestResponse { status: "success", snapshot }))
}

/// decode an ingest body; missing numbers are 0, a missing flag is false
pub fn parse_reading(body: &[u8]) -> ApiResult<NewReading> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("No data provided"));
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;
    let fields = match value {
        Value::Object(map) if !map.is_empty() => map,
        Value::Object(_) => return Err(ApiError::bad_request("No data provided")),
        _ => return Err(ApiError::bad_request("Expected a JSON object")),
    };

    Ok(NewReading {
        current: number_field(&fields, "current")?,
        voltage: number_field(&fields, "voltage")?,
        motion_detected: flag_field(&fields, "motion_detected")?,
    })
}

fn number_field(fields: &Map<String, Value>, key: &str) -> ApiResult<f64> {
    let parsed = match fields.get(key) {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(_) => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::bad_request(format!("'{}' must be a number", key)))
}

fn flag_field(fields: &Map<String, Value>, key: &str) -> ApiResult<bool> {
    let parsed = match fields.get(key) {
        None | Some(Value::Null) => Some(false),
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        Some(_) => None,
    };
    parsed.ok_or_else(|| ApiError::bad_request(format!("'{}' must be a boolean", key)))
}

// ==============================================================================
// operator control
// ==============================================================================

#[derive(Deserialize)]
struct ControlRequest {
    action: Option<String>,
}

#[derive(Serialize)]
struct ControlResponse {
    status: &'static str,
    appliance_status: bool,
    message: &'static str,
    command_id: i64,
}

/// POST /control {action: "turn_on" | "turn_off"}
async fn control_handler(State(relay): State<Relay>, body: Bytes) -> ApiResult<Json<ControlResponse>> {
    let request: ControlRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Action not specified"))?;
    let raw = request
        .action
        .ok_or_else(|| ApiError::bad_request("Action not specified"))?;
    let action = ControlAction::parse(&raw)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown action '{}'", raw)))?;

    let outcome = relay.control(action).await?;
    Ok(Json(ControlResponse {
        status: "success",
        appliance_status: outcome.appliance_status,
        message: outcome.message,
        command_id: outcome.command_id,
    }))
}

// ==============================================================================
// reads
// ==============================================================================

#[derive(Serialize)]
struct StatusResponse {
    sensor_data: LiveState,
    action_log: Vec<ActionLogEntry>,
}

async fn status_handler(State(relay): State<Relay>) -> Json<StatusResponse> {
    let (sensor_data, action_log) = relay.status().await;
    Json(StatusResponse { sensor_data, action_log })
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<DeviceCommand>,
}

/// device polling path; every returned command is now executed
async fn pending_commands_handler(State(relay): State<Relay>) -> ApiResult<Json<CommandsResponse>> {
    let commands = relay.pending_commands().await?;
    Ok(Json(CommandsResponse { commands }))
}

#[derive(Deserialize)]
struct ReadingsParams {
    limit: Option<u32>,
}

#[derive(Serialize)]
struct ReadingsResponse {
    readings: Vec<SensorReading>,
}

async fn readings_handler(
    State(relay): State<Relay>,
    Query(params): Query<ReadingsParams>,
) -> ApiResult<Json<ReadingsResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_READINGS).min(MAX_READINGS);
    let readings = relay.recent_readings(limit).await?;
    Ok(Json(ReadingsResponse { readings }))
}

async fn health_handler(State(relay): State<Relay>) -> (StatusCode, &'static str) {
    match relay.store().ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::test_relay;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[test]
    fn parse_reading_coerces_and_defaults() {
        let r = parse_reading(br#"{"current": "1.5", "motion_detected": 1}"#).unwrap();
        assert_eq!(r.current, 1.5);
        assert_eq!(r.voltage, 0.0);
        assert!(r.motion_detected);

        let r = parse_reading(br#"{"voltage": 230, "motion_detected": "off"}"#).unwrap();
        assert_eq!(r.voltage, 230.0);
        assert!(!r.motion_detected);
    }

    #[test]
    fn parse_reading_rejects_junk() {
        assert!(parse_reading(b"").is_err());
        assert!(parse_reading(b"{}").is_err());
        assert!(parse_reading(b"[1,2]").is_err());
        assert!(parse_reading(b"not json").is_err());
        assert!(parse_reading(br#"{"current": "lots"}"#).is_err());
        assert!(parse_reading(br#"{"motion_detected": "maybe"}"#).is_err());
    }

    #[tokio::test]
    async fn empty_ingest_is_bad_request() {
        let app = router(test_relay().await);
        let (status, body) = call(&app, Method::POST, "/ingest", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = call(&app, Method::POST, "/ingest", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingest_returns_snapshot_and_status_reflects_it() {
        let app = router(test_relay().await);
        let (status, body) = call(
            &app,
            Method::POST,
            "/ingest",
            r#"{"current": 0.8, "voltage": 229.0, "motion_detected": true}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["snapshot"]["current"], 0.8);

        let (_, status_body) = call(&app, Method::GET, "/status", "").await;
        assert_eq!(status_body["sensor_data"], body["snapshot"]);
        assert_eq!(status_body["action_log"], serde_json::json!([]));

        let (_, readings) = call(&app, Method::GET, "/readings?limit=5", "").await;
        assert_eq!(readings["readings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn turn_on_is_reflected_in_status_and_log() {
        let app = router(test_relay().await);
        let (status, body) = call(&app, Method::POST, "/control", r#"{"action": "turn_on"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["appliance_status"], true);
        assert_eq!(body["message"], "Appliance turned ON");

        let (_, status_body) = call(&app, Method::GET, "/status", "").await;
        assert_eq!(status_body["sensor_data"]["appliance_status"], true);
        let newest = status_body["action_log"][0]["details"].as_str().unwrap();
        assert!(newest.contains("ON"));
    }

    #[tokio::test]
    async fn bad_control_actions_are_rejected() {
        let app = router(test_relay().await);
        for body in ["{}", r#"{"action": "toggle"}"#, "", r#"{"action": 1}"#] {
            let (status, _) = call(&app, Method::POST, "/control", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        }
        let (_, cmds) = call(&app, Method::GET, "/pending-commands", "").await;
        assert_eq!(cmds["commands"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn pending_commands_drain_once() {
        let app = router(test_relay().await);
        call(&app, Method::POST, "/control", r#"{"action": "turn_on"}"#).await;
        call(&app, Method::POST, "/control", r#"{"action": "turn_off"}"#).await;

        let (status, body) = call(&app, Method::GET, "/pending-commands", "").await;
        assert_eq!(status, StatusCode::OK);
        let cmds = body["commands"].as_array().unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0]["command"], "appliance_control");
        assert_eq!(cmds[0]["value"], true);
        assert_eq!(cmds[1]["value"], false);
        assert!(cmds[0].get("executed").is_none());

        let (_, again) = call(&app, Method::GET, "/pending-commands", "").await;
        assert_eq!(again["commands"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn health_and_dashboard_are_served() {
        let app = router(test_relay().await);
        let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("/ws"));
    }
}
