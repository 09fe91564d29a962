// Explore Assistant Handler
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::proxy::common::RelayError;
use crate::proxy::server::AppState;

/// Body accepted by `POST /`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub contents: String,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default, rename = "loggingData")]
    pub logging_data: Option<Map<String, Value>>,
}

/// Pulls the user id out of supplied logging data.
///
/// Looker may send the id as a string or a number; numbers are keyed by
/// their decimal form. Missing, null, empty, zero and boolean ids are rejected.
fn extract_user_id(logging_data: &Map<String, Value>) -> Result<String, RelayError> {
    match logging_data.get("user") {
        Some(Value::String(user)) if !user.is_empty() => Ok(user.clone()),
        Some(Value::Number(user)) if user.as_f64() != Some(0.0) => Ok(user.to_string()),
        _ => Err(RelayError::ClientInput(
            "User ID not found in loggingData".to_string(),
        )),
    }
}

/// 处理 Explore Assistant 查询
pub async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RelayError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection);
        RelayError::ClientInput(rejection.body_text())
    })?;

    let user_id = request
        .logging_data
        .as_ref()
        .map(extract_user_id)
        .transpose()?;

    let request_id = uuid::Uuid::new_v4();
    tracing::debug!(
        "Request {} | user: {} | contents: {} chars",
        request_id,
        user_id.as_deref().unwrap_or("<anonymous>"),
        request.contents.len()
    );

    let response_text = state
        .translator
        .translate(
            user_id.as_deref(),
            &request.contents,
            request.parameters.as_ref(),
        )
        .await
        .map_err(|e| {
            error!("Internal server error: {} (request {})", e, request_id);
            e
        })?;

    if let Some(mut logging_data) = request.logging_data {
        logging_data.insert(
            "explore_url".to_string(),
            Value::String(response_text.clone()),
        );
        // Bound outside the macro: `info!` shadows `Value` with tracing's trait.
        let data = Value::Object(logging_data);
        info!(request_id = %request_id, data = %data, "Explore Assistant Request");
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        response_text,
    ))
}
