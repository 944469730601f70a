//! Profile, friendship, like, story and event endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::account::load_language;
use crate::events::add_event;
use crate::relationship::{
    accept_friend_request, block_user, compute_mutual_friends, decline_friend_request,
    filter_friends, list_incoming_requests, resolve_relationship, toggle_friend_request,
    toggle_hide_my_stories, toggle_hide_their_stories, toggle_like, view_profile, ViewContext,
};
use crate::storage::UserRow;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, local_now, ok_json, social_error, viewer};

/// Create or update the caller's own user document.
pub async fn upsert_user_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(mut user): axum::Json<UserRow>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if me != user_id {
        return api_error(StatusCode::FORBIDDEN, "cannot edit another user's profile");
    }
    if user.username.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "username cannot be empty");
    }
    user.id = user_id;
    if user.created_at == 0 {
        user.created_at = crate::now_millis();
    }
    let storage = state.storage.lock().await;
    if let Err(e) = storage.upsert_user(&user) {
        crate::slog!("profile: failed to save {}: {}", crate::logging::user_id(&me), e);
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    match storage.get_user(&user.id) {
        Ok(Some(saved)) => ok_json(serde_json::json!(saved)),
        Ok(None) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "profile vanished after save"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_profile_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    let language = load_language(&storage).unwrap_or_default();
    match view_profile(&storage, &me, &user_id, local_now(), language) {
        Ok(view) => ok_json(serde_json::json!(view)),
        Err(e) => social_error(e),
    }
}

pub async fn relationship_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match resolve_relationship(&storage, &me, &user_id) {
        Ok(relationship) => ok_json(serde_json::json!(relationship)),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Full mutual-friends list, optionally filtered by username.
pub async fn mutual_friends_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match compute_mutual_friends(&storage, &me, &user_id) {
        Ok(friends) => {
            let total = friends.len();
            let shown = filter_friends(&friends, &query.q);
            ok_json(serde_json::json!({ "total": total, "friends": shown }))
        }
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize, Default)]
pub struct FriendToggleRequest {
    #[serde(default)]
    context: ViewContext,
}

pub async fn friend_toggle_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    body: Option<axum::Json<FriendToggleRequest>>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let context = body.map(|b| b.0.context).unwrap_or_default();
    let storage = state.storage.lock().await;
    match toggle_friend_request(&storage, &me, &user_id, context, crate::now_millis()) {
        Ok(outcome) => {
            let relationship = resolve_relationship(&storage, &me, &user_id).ok();
            ok_json(serde_json::json!({ "outcome": outcome, "relationship": relationship }))
        }
        Err(e) => social_error(e),
    }
}

pub async fn list_friend_requests_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match list_incoming_requests(&storage, &me) {
        Ok(requests) => ok_json(serde_json::json!(requests)),
        Err(e) => social_error(e),
    }
}

pub async fn accept_friend_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(from_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match accept_friend_request(&storage, &me, &from_id, crate::now_millis()) {
        Ok(()) => ok_json(serde_json::json!({ "accepted": true })),
        Err(e) => social_error(e),
    }
}

pub async fn decline_friend_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(from_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match decline_friend_request(&storage, &me, &from_id) {
        Ok(()) => ok_json(serde_json::json!({ "declined": true })),
        Err(e) => social_error(e),
    }
}

pub async fn like_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match toggle_like(&storage, &me, &user_id, crate::now_millis()) {
        Ok(outcome) => ok_json(serde_json::json!(outcome)),
        Err(e) => social_error(e),
    }
}

pub async fn hide_stories_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match toggle_hide_their_stories(&storage, &me, &user_id) {
        Ok(hidden) => ok_json(serde_json::json!({ "hide_their_stories": hidden })),
        Err(e) => social_error(e),
    }
}

pub async fn hide_my_stories_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match toggle_hide_my_stories(&storage, &me, &user_id) {
        Ok(hidden) => ok_json(serde_json::json!({ "hide_my_stories": hidden })),
        Err(e) => social_error(e),
    }
}

pub async fn block_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match block_user(&storage, &me, &user_id, crate::now_millis()) {
        Ok(()) => ok_json(serde_json::json!({ "blocked": true })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct AddEventRequest {
    #[serde(default)]
    title: String,
    date: String,
}

/// Add an event to the caller's own profile.
pub async fn add_event_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<AddEventRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if me != user_id {
        return api_error(StatusCode::FORBIDDEN, "events can only be added to your own profile");
    }
    let storage = state.storage.lock().await;
    let language = load_language(&storage).unwrap_or_default();
    match add_event(
        &storage,
        &me,
        &req.title,
        &req.date,
        language,
        local_now(),
        crate::now_millis(),
    ) {
        Ok(event) => (StatusCode::CREATED, axum::Json(event)).into_response(),
        Err(e) => social_error(e),
    }
}
