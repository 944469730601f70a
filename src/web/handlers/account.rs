//! Password reset and language preference endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;

use crate::account::{load_language, request_password_reset, save_language, Language};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, ok_json, social_error};

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    #[serde(default)]
    email: String,
}

pub async fn password_reset_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<PasswordResetRequest>,
) -> Response {
    let storage = state.storage.lock().await;
    match request_password_reset(&storage, &req.email, crate::now_millis()) {
        Ok(email) => ok_json(serde_json::json!({ "queued": true, "email": email })),
        Err(e) => social_error(e),
    }
}

pub async fn get_language_handler(State(state): State<SharedState>) -> Response {
    let storage = state.storage.lock().await;
    match load_language(&storage) {
        Ok(language) => ok_json(serde_json::json!({ "language": language })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct UpdateLanguageRequest {
    language: String,
}

pub async fn update_language_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<UpdateLanguageRequest>,
) -> Response {
    let Some(language) = Language::from_code(&req.language) else {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("unsupported language {:?}", req.language),
        );
    };
    let storage = state.storage.lock().await;
    match save_language(&storage, language) {
        Ok(()) => ok_json(serde_json::json!({ "language": language })),
        Err(e) => social_error(e),
    }
}
