//! Chat list and conversation endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Local;
use serde::Deserialize;

use crate::account::{load_language, Language};
use crate::chat_list::{
    delete_chat, delete_chats, filter_by_username, hide_chat, list_chats, list_hidden_chats,
    list_messages, mark_seen, mute_chats, open_chat, send_message, unhide_chat, ChatListEntry,
    MuteDuration,
};
use crate::web::state::SharedState;
use crate::web::utils::{ok_json, social_error, viewer};

/// List rows with the time label rendered for the saved language.
fn entries_json(entries: &[ChatListEntry], language: Language) -> serde_json::Value {
    let now = crate::now_millis();
    let rows: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| {
            let label = entry
                .time_label(now, &Local)
                .map(|l| l.localized(language));
            serde_json::json!({
                "chat_id": entry.chat_id,
                "counterpart": entry.counterpart,
                "last_message": entry.last_message,
                "time_label": label,
                "unread": entry.unread,
                "muted": entry.muted,
                "muted_until": entry.muted_until,
            })
        })
        .collect();
    serde_json::json!({ "chats": rows })
}

#[derive(Deserialize)]
pub struct ChatSearchQuery {
    #[serde(default)]
    q: String,
}

pub async fn list_chats_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<ChatSearchQuery>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    let language = load_language(&storage).unwrap_or_default();
    match list_chats(&storage, &me, crate::now_millis()) {
        Ok(entries) => {
            let shown = if query.q.trim().is_empty() {
                entries
            } else {
                filter_by_username(&entries, &query.q)
            };
            ok_json(entries_json(&shown, language))
        }
        Err(e) => social_error(e),
    }
}

pub async fn list_hidden_chats_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    let language = load_language(&storage).unwrap_or_default();
    match list_hidden_chats(&storage, &me, crate::now_millis()) {
        Ok(entries) => ok_json(entries_json(&entries, language)),
        Err(e) => social_error(e),
    }
}

pub async fn open_chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(other_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match open_chat(&storage, &me, &other_id, crate::now_millis()) {
        Ok(chat_id) => ok_json(serde_json::json!({ "chat_id": chat_id })),
        Err(e) => social_error(e),
    }
}

pub async fn list_messages_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match list_messages(&storage, &chat_id, &me) {
        Ok(messages) => ok_json(serde_json::json!({ "messages": messages })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    text: String,
}

pub async fn send_message_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match send_message(&storage, &chat_id, &me, &req.text, crate::now_millis()) {
        Ok(message) => (StatusCode::CREATED, axum::Json(message)).into_response(),
        Err(e) => social_error(e),
    }
}

pub async fn mark_seen_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match mark_seen(&storage, &chat_id, &me) {
        Ok(updated) => ok_json(serde_json::json!({ "updated": updated })),
        Err(e) => social_error(e),
    }
}

pub async fn delete_chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match delete_chat(&storage, &me, &chat_id, crate::now_millis()) {
        Ok(()) => ok_json(serde_json::json!({ "deleted": [chat_id] })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    password: String,
}

pub async fn hide_chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    axum::Json(req): axum::Json<PasswordRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match hide_chat(&storage, &me, &chat_id, &req.password, crate::now_millis()) {
        Ok(()) => ok_json(serde_json::json!({ "hidden": true })),
        Err(e) => social_error(e),
    }
}

pub async fn unhide_chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    axum::Json(req): axum::Json<PasswordRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match unhide_chat(&storage, &me, &chat_id, &req.password) {
        Ok(()) => ok_json(serde_json::json!({ "hidden": false })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    chat_ids: Vec<String>,
}

pub async fn bulk_delete_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<BulkDeleteRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let storage = state.storage.lock().await;
    match delete_chats(&storage, &me, &req.chat_ids, crate::now_millis()) {
        Ok(()) => ok_json(serde_json::json!({ "deleted": req.chat_ids })),
        Err(e) => social_error(e),
    }
}

#[derive(Deserialize)]
pub struct BulkMuteRequest {
    #[serde(default)]
    chat_ids: Vec<String>,
    hours: u32,
}

pub async fn bulk_mute_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<BulkMuteRequest>,
) -> Response {
    let me = match viewer(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let duration = match MuteDuration::from_hours(req.hours) {
        Ok(d) => d,
        Err(e) => return social_error(e),
    };
    let storage = state.storage.lock().await;
    match mute_chats(&storage, &me, &req.chat_ids, duration, crate::now_millis()) {
        Ok(until) => ok_json(serde_json::json!({ "muted": req.chat_ids, "until": until })),
        Err(e) => social_error(e),
    }
}
