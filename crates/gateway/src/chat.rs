//! `POST /chat`: one message in, one reply out.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use turnrelay_agent::ChatInput;
use turnrelay_core::error::{Error, ModelError};

use crate::SharedState;

/// Fixed confidence reported with every reply.
const CONFIDENCE: f64 = 0.85;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub corpus_context: Option<String>,
    /// Any other routing metadata the caller attached.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub confidence: f64,
    pub memory_updated: bool,
    pub escalation_needed: bool,
    pub escalation_reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

/// HTTP status for a failed invocation.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Model(ModelError::Upstream { status_code, .. }) => {
            StatusCode::from_u16(*status_code).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        Error::Model(ModelError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        Error::Model(ModelError::NotConfigured(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Model(ModelError::Network(_) | ModelError::InvalidResponse(_)) => StatusCode::BAD_GATEWAY,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| api_error(rejection.status(), rejection.body_text()))?;

    let input = ChatInput {
        session_id: payload
            .session_id
            .unwrap_or_else(|| state.service.default_session_id.clone()),
        user_id: payload
            .user_id
            .unwrap_or_else(|| state.service.default_user_id.clone()),
        model: payload.model.unwrap_or_else(|| state.default_model.clone()),
        query: payload.query,
        context: payload.corpus_context,
        flags: payload.metadata,
    };
    info!(
        session = %input.session_id,
        model = %input.model,
        query_len = input.query.len(),
        has_context = input.context.is_some(),
        "Chat request"
    );

    let outcome = state
        .pipeline
        .run(input)
        .await
        .map_err(|e| api_error(status_for(&e), e.to_string()))?;

    Ok(Json(ChatResponse {
        response: outcome.reply.text,
        confidence: CONFIDENCE,
        memory_updated: true,
        escalation_needed: outcome.reply.escalation_needed,
        escalation_reason: outcome.reply.escalation_reason,
    }))
}
