//! Request-content extraction and root-nonce authentication.
//!
//! Every API call carries its arguments as a JSON object serialized into the
//! `content` form field. A request relayed by the local socket bridge also
//! carries a `root-user-nonce` key inside that object.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequest, Request};
use axum::Form;
use serde_json::{Map, Value};

use super::response::ApiError;
use crate::AppState;

/// Form field holding the JSON request content.
pub const API_REQUEST_CONTENT_KEY: &str = "content";

/// Key inside the request content that carries a root-user nonce.
pub const ROOT_NONCE_KEY: &str = "root-user-nonce";

/// Who sent a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Relayed through the local socket with a live nonce.
    Root,
    /// No root nonce was supplied.
    Anonymous,
}

/// Parsed request content plus the resolved caller.
///
/// The root nonce is removed from `content` before handlers see it.
#[derive(Debug)]
pub struct ApiRequest {
    pub caller: Caller,
    pub content: Map<String, Value>,
}

#[axum::async_trait]
impl FromRequest<Arc<AppState>> for ApiRequest {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Form(mut form) = Form::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid form body: {e}")))?;

        let raw = form.remove(API_REQUEST_CONTENT_KEY).ok_or_else(|| {
            ApiError::bad_request(format!(
                "Missing '{API_REQUEST_CONTENT_KEY}' field in request"
            ))
        })?;

        let content: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| {
            ApiError::bad_request(format!("Request content is not a JSON object: {e}"))
        })?;

        resolve_caller(state, content)
    }
}

/// Split the root nonce out of `content` and decide who the caller is.
pub fn resolve_caller(
    state: &AppState,
    mut content: Map<String, Value>,
) -> Result<ApiRequest, ApiError> {
    let caller = match content.remove(ROOT_NONCE_KEY) {
        None => Caller::Anonymous,
        Some(Value::String(nonce)) if state.nonces.contains(&nonce) => Caller::Root,
        Some(_) => {
            tracing::warn!("Rejected request with an unknown root nonce");
            return Err(ApiError::unauthorized("Invalid root user nonce"));
        }
    };

    Ok(ApiRequest { caller, content })
}
