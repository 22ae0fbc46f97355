use crate::commands::Command;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use glucmon_notify::interaction::{
    ephemeral_reply, pong, verify_signature, Interaction, INTERACTION_COMMAND, INTERACTION_PING,
};
use serde::Serialize;
use serde_json::Value;

const SIGNATURE_HEADER: &str = "X-Signature-Ed25519";
const TIMESTAMP_HEADER: &str = "X-Signature-Timestamp";

/// API 统一响应包裹
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 错误码（成功时为 0）
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (Utc::now() - state.start_time).num_seconds(),
        },
    )
}

fn signature_valid(public_key: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    match (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER)) {
        (Some(signature), Some(timestamp)) => {
            verify_signature(public_key, timestamp, body, signature)
        }
        _ => false,
    }
}

/// Chat platform interaction webhook.
async fn interactions(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(key) = &state.public_key {
        if !signature_valid(key, &headers, &body) {
            tracing::warn!(trace_id = %trace_id.0, "Rejected interaction with bad signature");
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "invalid request signature",
            );
        }
    }

    let interaction: Interaction = match serde_json::from_slice(&body) {
        Ok(i) => i,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &format!("invalid interaction: {e}"),
            );
        }
    };

    match (interaction.kind, interaction.data) {
        (INTERACTION_PING, _) => Json(pong()).into_response(),
        (INTERACTION_COMMAND, Some(data)) => {
            let name = data.name.clone();
            let result = match Command::parse(&data) {
                Ok(command) => state.commands.execute(command).await,
                Err(e) => Err(e),
            };
            let content = match result {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(trace_id = %trace_id.0, command = %name, error = %e, "Command failed");
                    format!("Unable to complete {name}: {e}")
                }
            };
            Json(ephemeral_reply(&content)).into_response()
        }
        (kind, _) => error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            &format!("unsupported interaction type {kind}"),
        ),
    }
}

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/interactions", post(interactions))
        .layer(middleware::from_fn(crate::logging::request_logging))
        .with_state(state)
}
