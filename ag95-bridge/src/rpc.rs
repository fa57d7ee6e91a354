//! HTTP endpoint exposing the gripper operations as remote procedures.
//!
//! `POST /rpc` takes `{"method": "set_force", "params": [55]}` and answers
//! `{"result": true}`. Device faults never turn into HTTP errors; they only
//! show up as `false` or `-1` results.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::gripper::Gripper;
use crate::registers::REGISTER_MAP;
use crate::routines::{CLOSE_FORCE, CLOSE_POSITION, OPEN_FORCE, OPEN_POSITION};
use crate::transport::Connector;

/// Prefix used by robot-side scripts; stripped before dispatch.
pub const METHOD_PREFIX: &str = "dh_ag95_";

/// A remote-procedure call.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Result of a remote-procedure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RpcValue {
    Bool(bool),
    Int(i32),
}

/// Malformed call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),
    #[error("Parameter {index} of '{method}' must be {expected}")]
    InvalidParam {
        method: String,
        index: usize,
        expected: &'static str,
    },
    #[error("Missing parameter {index} of '{method}'")]
    MissingParam { method: String, index: usize },
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match self {
            RpcError::UnknownMethod(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

struct Params<'a> {
    method: &'a str,
    values: &'a [Value],
}

impl Params<'_> {
    fn invalid(&self, index: usize, expected: &'static str) -> RpcError {
        RpcError::InvalidParam {
            method: self.method.to_string(),
            index,
            expected,
        }
    }

    fn bool_or(&self, index: usize, default: bool) -> Result<bool, RpcError> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            // Some robot scripts send 0/1.
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|n| n != 0)
                .ok_or_else(|| self.invalid(index, "a boolean")),
            Some(_) => Err(self.invalid(index, "a boolean")),
        }
    }

    fn int_or(&self, index: usize, default: i64) -> Result<i64, RpcError> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| self.invalid(index, "an integer")),
            Some(_) => Err(self.invalid(index, "an integer")),
        }
    }

    fn int(&self, index: usize) -> Result<i64, RpcError> {
        if matches!(self.values.get(index), None | Some(Value::Null)) {
            return Err(RpcError::MissingParam {
                method: self.method.to_string(),
                index,
            });
        }
        self.int_or(index, 0)
    }
}

/// Run one call against the gripper.
pub async fn dispatch<C: Connector>(
    gripper: &Gripper<C>,
    request: &RpcRequest,
) -> Result<RpcValue, RpcError> {
    use RpcValue::{Bool, Int};

    let method = request
        .method
        .strip_prefix(METHOD_PREFIX)
        .unwrap_or(&request.method);
    let params = Params {
        method,
        values: &request.params,
    };

    let value = match method {
        "connect" => Bool(gripper.connect().await),
        "init" => Bool(gripper.init(params.bool_or(0, false)?).await),
        "is_init" => Bool(gripper.is_init().await),
        "set_io_control" => Bool(gripper.set_io_control(params.bool_or(0, false)?).await),
        "set_init_grip_open" => Bool(gripper.set_init_grip_open(params.bool_or(0, true)?).await),
        "set_force" => Bool(gripper.set_force(params.int_or(0, CLOSE_FORCE)?).await),
        "set_position" => Bool(gripper.set_position(params.int(0)?).await),
        "get_actual_position" => Int(gripper.get_actual_position().await),
        "get_grip_status" => Int(gripper.get_grip_status().await),
        "init_wait" => Bool(gripper.init_wait(params.bool_or(0, false)?).await),
        "auto_init" => Bool(gripper.auto_init().await),
        "wait_grip" => Bool(gripper.wait_grip().await),
        "open" => {
            let force = params.int_or(0, OPEN_FORCE)?;
            let position = params.int_or(1, OPEN_POSITION)?;
            let wait = params.bool_or(2, true)?;
            Bool(gripper.open(force, position, wait).await)
        }
        "close" => {
            let force = params.int_or(0, CLOSE_FORCE)?;
            let position = params.int_or(1, CLOSE_POSITION)?;
            let wait = params.bool_or(2, true)?;
            Bool(gripper.close(force, position, wait).await)
        }
        "toggle" => Bool(gripper.toggle().await),
        _ => return Err(RpcError::UnknownMethod(request.method.clone())),
    };

    Ok(value)
}

/// Application state shared across handlers.
struct AppState<C: Connector> {
    gripper: Arc<Gripper<C>>,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            gripper: self.gripper.clone(),
        }
    }
}

/// Create the HTTP router.
pub fn create_router<C: Connector>(gripper: Arc<Gripper<C>>) -> Router {
    let state = AppState { gripper };

    Router::new()
        .route("/rpc", post(rpc_handler::<C>))
        .route("/health", get(health_handler::<C>))
        .route("/registers", get(registers_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /rpc endpoint.
async fn rpc_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Json(request): Json<RpcRequest>,
) -> Response {
    debug!("RPC call: {}({:?})", request.method, request.params);

    match dispatch(&state.gripper, &request).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(e) => {
            warn!("Rejected RPC call: {}", e);
            e.into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler<C: Connector>(State(state): State<AppState<C>>) -> Response {
    let link = state.gripper.link();
    let status = link.status().await;
    let stats = link.stats().await;
    let body = json!({
        "endpoint": link.endpoint(),
        "link": status,
        "stats": stats,
    });

    (StatusCode::OK, Json(body)).into_response()
}

/// Handler for the /registers endpoint.
async fn registers_handler() -> Response {
    (StatusCode::OK, Json(REGISTER_MAP)).into_response()
}

/// Remote-procedure server.
pub struct RpcServer<C: Connector> {
    gripper: Arc<Gripper<C>>,
    listen_addr: SocketAddr,
}

impl<C: Connector> RpcServer<C> {
    pub fn new(gripper: Arc<Gripper<C>>, listen_addr: SocketAddr) -> Self {
        Self {
            gripper,
            listen_addr,
        }
    }

    /// Run the server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.gripper);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "Gripper RPC server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("RPC server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("RPC server error: {}", e))?;

        info!("RPC server stopped");
        Ok(())
    }
}
