//! Shared helpers for the HTTP handlers.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{Local, NaiveDateTime};

use crate::error::SocialError;
use crate::storage::StorageError;
use crate::web::config::VIEWER_HEADER;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a service error onto the HTTP status the client shows as an alert.
pub fn social_error(error: SocialError) -> Response {
    let status = match &error {
        SocialError::NotFound(_) => StatusCode::NOT_FOUND,
        SocialError::Validation(_) => StatusCode::BAD_REQUEST,
        SocialError::Forbidden(_) | SocialError::Blocked => StatusCode::FORBIDDEN,
        SocialError::WrongPassword => StatusCode::UNAUTHORIZED,
        SocialError::Storage(StorageError::AlreadyExists(_)) => StatusCode::CONFLICT,
        SocialError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, error.to_string())
}

/// `200 OK` with a JSON body.
pub fn ok_json(body: serde_json::Value) -> Response {
    (StatusCode::OK, axum::Json(body)).into_response()
}

/// The signed-in user, from the viewer header.
pub fn viewer(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(VIEWER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                format!("missing {VIEWER_HEADER} header"),
            )
        })
}

/// Wall-clock time in the server's zone, for date-only rules.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn viewer_header_is_required() {
        let mut headers = HeaderMap::new();
        assert!(viewer(&headers).is_err());
        headers.insert(VIEWER_HEADER, HeaderValue::from_static("  "));
        assert!(viewer(&headers).is_err());
        headers.insert(VIEWER_HEADER, HeaderValue::from_static("u1"));
        assert_eq!(viewer(&headers).ok().as_deref(), Some("u1"));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            social_error(SocialError::WrongPassword).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(social_error(SocialError::Blocked).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            social_error(SocialError::Storage(StorageError::AlreadyExists("x".into()))).status(),
            StatusCode::CONFLICT
        );
    }
}
