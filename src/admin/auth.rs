//! Shared-secret authentication for the admin routes.
//!
//! The `x-api-key` header is compared in constant time against the
//! configured secret. A server with no secret configured answers 500 for
//! every admin request — misconfiguration must never fail open.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use super::{AdminState, error_response};

pub async fn api_key(
    State(state): State<AdminState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API key no configurada en el servidor",
            None,
        );
    };

    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !constant_time_eq(provided, expected) {
        return error_response(StatusCode::UNAUTHORIZED, "No autorizado", None);
    }

    next.run(req).await
}

/// Byte-wise comparison without early exit on mismatch.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_match() {
        assert!(constant_time_eq("secreto", "secreto"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn different_strings_do_not_match() {
        assert!(!constant_time_eq("secreto", "secreta"));
        assert!(!constant_time_eq("secreto", ""));
        assert!(!constant_time_eq("secreto", "secreto "));
    }

    #[test]
    fn length_mismatch_short_circuits_safely() {
        assert!(!constant_time_eq("abc", "abcdef"));
    }
}
