//! Report flow endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::complaint::{begin_report, submit_complaint};
use crate::web::state::SharedState;
use crate::web::utils::{ok_json, social_error, viewer};

/// Open the report form for a user.
pub async fn begin_report_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    let storage = state.storage.lock().await;
    match begin_report(&storage, &user_id) {
        Ok(target) => ok_json(serde_json::json!({ "target": target })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct SubmitComplaintRequest {
    reported_id: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    description: String,
}

pub async fn submit_complaint_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<SubmitComplaintRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match submit_complaint(
        &storage,
        &me,
        &req.reported_id,
        &req.reason,
        &req.description,
        crate::now_millis(),
    ) {
        Ok(row) => (StatusCode::CREATED, axum::Json(row)).into_response(),
        Err(e) => social_error(e),
    }
}
