//! The three inbound proxy routes (spec §6): `/v1/messages`,
//! `/v1/messages/count_tokens`, `/v1/chat/completions`. All three share
//! one handler -- the dispatcher itself classifies the wire shape from
//! the request path (spec §4.H step 2).

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use relay_dispatcher::{DispatchMeta, DispatchOutcome, DispatchRequest};
use tracing::{error, instrument};

use crate::api::AppState;
use crate::error::ApiError;

const HEADER_ACCOUNT: HeaderName = HeaderName::from_static("x-proxy-account");
const HEADER_STRATEGY: HeaderName = HeaderName::from_static("x-proxy-strategy");
const HEADER_TENANT: HeaderName = HeaderName::from_static("x-proxy-tenant");

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn proxy_headers(resp: &mut Response, meta: &DispatchMeta) {
    let h = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&meta.account_id) {
        h.insert(HEADER_ACCOUNT, v);
    }
    if let Some(strategy) = &meta.strategy {
        if let Ok(v) = HeaderValue::from_str(strategy) {
            h.insert(HEADER_STRATEGY, v);
        }
    }
    if let Some(tenant) = &meta.tenant_id {
        if let Ok(v) = HeaderValue::from_str(tenant) {
            h.insert(HEADER_TENANT, v);
        }
    }
}

/// `POST /v1/messages`, `POST /v1/messages/count_tokens`, `POST
/// /v1/chat/completions`. One handler for all three: the dispatcher
/// classifies the inbound shape from `uri.path()`.
#[instrument(skip(state, headers, body), fields(path = %uri.path()))]
pub async fn dispatch(State(state): State<AppState>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let path = uri.path().to_owned();
    let inbound = relay_dispatcher::classify::classify_path(&path);

    let request = DispatchRequest {
        path,
        body,
        x_api_key: header_str(&headers, HeaderName::from_static("x-api-key")),
        authorization: header_str(&headers, header::AUTHORIZATION),
    };

    match state.dispatcher.dispatch(request).await {
        Ok(DispatchOutcome::Buffered(buffered)) => {
            let status = StatusCode::from_u16(buffered.status).unwrap_or(StatusCode::OK);
            let mut resp = (status, [(header::CONTENT_TYPE, "application/json")], buffered.body).into_response();
            proxy_headers(&mut resp, &buffered.meta);
            resp
        }
        Ok(DispatchOutcome::Stream(stream_outcome)) => {
            let status = StatusCode::from_u16(stream_outcome.status).unwrap_or(StatusCode::OK);
            let body = Body::from_stream(stream_outcome.stream.map(Ok::<_, std::io::Error>));
            let mut resp = (status, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
            proxy_headers(&mut resp, &stream_outcome.meta);
            resp
        }
        Err(err) => {
            error!(error = %err, "dispatch failed");
            ApiError::new(inbound, err).into_response()
        }
    }
}

/// `OPTIONS *` -- always 204, permissive CORS handled by the layer.
pub async fn options_ok() -> StatusCode {
    StatusCode::NO_CONTENT
}
