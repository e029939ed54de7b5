//! HTTP transport: `POST /mcp` carries one JSON-RPC envelope per request,
//! `GET /health` maps [`ServerContext::health_snapshot`] onto the external
//! `{status, timestamp, server_info}` probe contract. Per spec §6, this is
//! a thin collaborator around the core — no pooling or caching decisions
//! are made here.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use obridge_server::protocol::{JsonRpcRequest, Session};
use obridge_server::{dispatch, HealthSnapshot, LifecycleState, ServerContext};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use super::TransportError;

/// External `GET /health` contract (spec §6) — deliberately narrower than
/// [`HealthSnapshot`], which is an internal diagnostics shape not meant for
/// outside probes.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: HealthStatus,
    timestamp: String,
    server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
    uptime_secs: f64,
}

impl From<HealthSnapshot> for HealthResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        let status = match snapshot.state {
            LifecycleState::Running if snapshot.outlook_connected => HealthStatus::Healthy,
            LifecycleState::Running | LifecycleState::Draining => HealthStatus::Degraded,
            LifecycleState::Initializing | LifecycleState::Stopped => HealthStatus::Unhealthy,
        };
        Self {
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            server_info: ServerInfo {
                name: "outlook-bridge",
                version: env!("CARGO_PKG_VERSION"),
                uptime_secs: snapshot.uptime_secs,
            },
        }
    }
}

/// A single shared session backs every request on this listener. HTTP has
/// no notion of a persistent connection the way the stdio transport does,
/// so the handshake state the protocol layer expects lives here instead,
/// guarded by a mutex rather than one per TCP connection.
#[derive(Clone)]
struct AppState {
    ctx: Arc<ServerContext>,
    session: Arc<AsyncMutex<Session>>,
}

/// Binds `host:port` and serves until Ctrl-C.
///
/// # Errors
/// Returns [`TransportError::Bind`] for an unparseable address and
/// [`TransportError::Io`] if the listener can't be bound or the server
/// exits with an I/O failure.
pub async fn serve(ctx: Arc<ServerContext>, host: String, port: u16) -> Result<(), TransportError> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| TransportError::Bind(format!("{host}:{port}: {e}")))?;

    let state = AppState {
        ctx,
        session: Arc::new(AsyncMutex::new(Session::new())),
    };
    let app = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http transport listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(ctrl_c())
        .await?;
    Ok(())
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn handle_mcp(State(state): State<AppState>, Json(request): Json<JsonRpcRequest>) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    match dispatch(&state.ctx, &mut session, None, None, request).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse::from(state.ctx.health_snapshot().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obridge_core::config::Config;
    use obridge_server::protocol::JsonRpcId;
    use obridge_test_helpers::{FixedAdapterFactory, MockAdapter};
    use serde_json::json;

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.pool.min_connections = 0;
        let factory = Arc::new(FixedAdapterFactory::new(Arc::new(MockAdapter::with_sample_inbox(2))));
        AppState {
            ctx: ServerContext::new(config, factory),
            session: Arc::new(AsyncMutex::new(Session::new())),
        }
    }

    #[tokio::test]
    async fn mcp_handler_round_trips_initialize() {
        let state = test_state();
        state.ctx.start().await.unwrap();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(JsonRpcId::Number(1)),
            method: "initialize".to_string(),
            params: json!({"client_name": "t", "client_version": "1", "capabilities": []}),
        };
        let response = handle_mcp(State(state), Json(request)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_handler_reports_running_state() {
        let state = test_state();
        state.ctx.start().await.unwrap();
        let snapshot = handle_health(State(state)).await.into_response();
        assert_eq!(snapshot.status(), StatusCode::OK);
    }

    fn snapshot_with(state: LifecycleState, outlook_connected: bool) -> HealthSnapshot {
        HealthSnapshot {
            state,
            outlook_connected,
            pool_stats: obridge_server::pool::PoolStats {
                idle: 0,
                in_use: 0,
                total: 0,
                waiters: 0,
                max_connections: 0,
            },
            cache_stats: obridge_core::metrics::global_metrics().snapshot(),
            uptime_secs: 12.0,
        }
    }

    #[test]
    fn running_and_connected_maps_to_healthy() {
        let response = HealthResponse::from(snapshot_with(LifecycleState::Running, true));
        assert!(matches!(response.status, HealthStatus::Healthy));
        assert_eq!(response.server_info.name, "outlook-bridge");
    }

    #[test]
    fn running_without_outlook_maps_to_degraded() {
        let response = HealthResponse::from(snapshot_with(LifecycleState::Running, false));
        assert!(matches!(response.status, HealthStatus::Degraded));
    }

    #[test]
    fn draining_maps_to_degraded() {
        let response = HealthResponse::from(snapshot_with(LifecycleState::Draining, true));
        assert!(matches!(response.status, HealthStatus::Degraded));
    }

    #[test]
    fn stopped_maps_to_unhealthy() {
        let response = HealthResponse::from(snapshot_with(LifecycleState::Stopped, false));
        assert!(matches!(response.status, HealthStatus::Unhealthy));
    }
}
