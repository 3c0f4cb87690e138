//! One-shot GraphQL over HTTP.
//!
//! `POST` bodies are request envelopes without an `id`; the router answers in
//! the response and pushes nothing. Headers set by the context builder (the
//! session cookie) are copied onto the HTTP response.

use std::sync::Arc;

use {
    axum::{
        extract::State,
        http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
        response::{IntoResponse, Response},
    },
    graphpush_server::{HandlerResponse, InboundEvent},
    tracing::{debug, warn},
};

use crate::state::GatewayState;

pub async fn graphql_post_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let mut event = InboundEvent::http(body);
    if let Some(cookie) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        event = event.with_header("cookie", cookie);
    }

    let response = state.handler.handle(event).await;
    debug!(status = response.status_code, "http: graphql request handled");
    into_http(response)
}

fn into_http(response: HandlerResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (name, value) in response.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            },
            _ => warn!(header = %name, "http: dropping invalid response header"),
        }
    }

    (status, headers, response.body).into_response()
}
