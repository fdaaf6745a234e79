use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::request::{ApiRequest, Caller};
use crate::api::response::{ApiError, JSend};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallerResponse {
    pub caller: String,
    pub content: Map<String, Value>,
}

pub async fn health(_request: ApiRequest) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse { healthy: true })
}

/// Report the caller identity. Only root callers are answered.
pub async fn caller(request: ApiRequest) -> Result<Json<JSend<CallerResponse>>, ApiError> {
    if request.caller != Caller::Root {
        return Err(ApiError::unauthorized("Root access required"));
    }

    tracing::debug!(keys = request.content.len(), "Answered root caller request");

    Ok(JSend::success(CallerResponse {
        caller: "root".to_string(),
        content: request.content,
    }))
}

pub async fn unknown_endpoint() -> ApiError {
    ApiError::not_found("Unknown API endpoint")
}
