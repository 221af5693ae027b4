//! Response helpers.
//!
//! # Responsibilities
//! - Build the fixed not-found and server-error responses
//! - Attach the anti-framing header to dispatched responses
//!
//! # Design Decisions
//! - Error bodies are fixed strings; handler or compiler details never leak
//! - Server errors do not carry the anti-framing header

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Body of every internal server error response.
pub const SERVER_ERROR_BODY: &str = "Internal server error";

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

pub fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_BODY).into_response()
}

/// Set `X-Frame-Options` unless the response is a server error.
pub fn with_frame_options(mut response: Response<Body>, value: &HeaderValue) -> Response<Body> {
    if !response.status().is_server_error() {
        response
            .headers_mut()
            .insert(header::X_FRAME_OPTIONS, value.clone());
    }
    response
}
