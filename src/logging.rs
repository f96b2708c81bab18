//! Middleware for logging requests and responses.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::cron_auth::CRON_SECRET_HEADER;

/// The number of bytes of a body that are logged at the `info` level.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// The largest request body that is read. No route takes a body, so this only
/// needs room for small clients that send one anyway.
pub const MAX_REQUEST_BODY_LENGTH: usize = 16 * 1024;

const REDACTED: &str = "********";

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level with the
/// trigger credentials redacted. If a body is longer than
/// [LOG_BODY_LENGTH_LIMIT] bytes, it is truncated and the full body is logged
/// at the `debug` level.
///
/// Request bodies over [MAX_REQUEST_BODY_LENGTH] bytes are rejected with
/// `413 Payload Too Large` before the request reaches a handler.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body_text = match body_to_text(body, MAX_REQUEST_BODY_LENGTH).await {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(
                method = %parts.method,
                uri = %parts.uri,
                "Rejecting request body over {MAX_REQUEST_BODY_LENGTH} bytes: {error}"
            );
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    tracing::info!(
        method = %parts.method,
        uri = %parts.uri,
        headers = ?redact_headers(&parts.headers),
        "Received request, body: {}",
        display_body(&body_text)
    );
    log_full_body("request", &body_text);

    let request = Request::from_parts(parts, body_text.into());
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body_text = match body_to_text(body, usize::MAX).await {
        Ok(text) => text,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    tracing::info!(
        status = %parts.status,
        headers = ?redact_headers(&parts.headers),
        "Sending response, body: {}",
        display_body(&body_text)
    );
    log_full_body("response", &body_text);

    Response::from_parts(parts, body_text.into())
}

async fn body_to_text(body: Body, limit: usize) -> Result<String, axum::Error> {
    let body_bytes = axum::body::to_bytes(body, limit).await?;

    Ok(String::from_utf8_lossy(&body_bytes).to_string())
}

/// Copy `headers` with the values of credential headers replaced.
fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut redacted = headers.clone();

    for name in [CRON_SECRET_HEADER, "authorization"] {
        if redacted.contains_key(name) {
            redacted.insert(name, HeaderValue::from_static(REDACTED));
        }
    }

    redacted
}

/// The part of `body` logged at the `info` level.
fn display_body(body: &str) -> String {
    if body.len() <= LOG_BODY_LENGTH_LIMIT {
        return format!("{body:?}");
    }

    let mut end = LOG_BODY_LENGTH_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }

    format!("{:?}...", &body[..end])
}

fn log_full_body(direction: &str, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::debug!("Full {direction} body: {body:?}");
    }
}
