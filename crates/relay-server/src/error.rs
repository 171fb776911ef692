//! Error envelope rendering for the two inbound wire shapes (spec §6,
//! "Error envelopes"). `relay_dispatcher::DispatchError` carries an
//! `ApiErrorKind` and a status; `ApiError` wraps it to render the JSON
//! body the client's shape expects and implements `IntoResponse` so
//! handlers can return it directly.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::InboundShape;
use relay_dispatcher::DispatchError;
use serde_json::json;

/// A dispatch failure paired with the inbound wire shape it must be
/// rendered for.
pub struct ApiError {
    inbound: InboundShape,
    err: DispatchError,
}

impl ApiError {
    #[must_use]
    pub fn new(inbound: InboundShape, err: DispatchError) -> Self {
        Self { inbound, err }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let kind = self.err.kind();
        // `Upstream`'s `Display` prefixes the status code onto the message;
        // here we want the bare upstream message, preserved verbatim.
        let message = match &self.err {
            DispatchError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let body = match self.inbound {
            InboundShape::OpenAi => json!({
                "error": {
                    "message": message,
                    "type": kind.to_string(),
                    "code": status.as_u16(),
                }
            }),
            InboundShape::Anthropic => json!({
                "type": "error",
                "error": {
                    "type": kind.to_string(),
                    "message": message,
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}
