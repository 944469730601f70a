//! Axum router construction.

use axum::routing::{get, post, put};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        // Profiles API
        .route(
            "/api/users/:user_id",
            put(handlers::profiles::upsert_user_handler),
        )
        .route(
            "/api/profiles/:user_id",
            get(handlers::profiles::get_profile_handler),
        )
        .route(
            "/api/profiles/:user_id/relationship",
            get(handlers::profiles::relationship_handler),
        )
        .route(
            "/api/profiles/:user_id/mutual-friends",
            get(handlers::profiles::mutual_friends_handler),
        )
        .route(
            "/api/profiles/:user_id/friend-toggle",
            post(handlers::profiles::friend_toggle_handler),
        )
        .route(
            "/api/profiles/:user_id/like",
            post(handlers::profiles::like_handler),
        )
        .route(
            "/api/profiles/:user_id/hide-stories",
            post(handlers::profiles::hide_stories_handler),
        )
        .route(
            "/api/profiles/:user_id/hide-my-stories",
            post(handlers::profiles::hide_my_stories_handler),
        )
        .route(
            "/api/profiles/:user_id/block",
            post(handlers::profiles::block_handler),
        )
        .route(
            "/api/profiles/:user_id/events",
            post(handlers::profiles::add_event_handler),
        )
        // Friend Requests API
        .route(
            "/api/friend-requests",
            get(handlers::profiles::list_friend_requests_handler),
        )
        .route(
            "/api/friend-requests/:from_id/accept",
            post(handlers::profiles::accept_friend_request_handler),
        )
        .route(
            "/api/friend-requests/:from_id/decline",
            post(handlers::profiles::decline_friend_request_handler),
        )
        // Complaints API
        .route(
            "/api/profiles/:user_id/report",
            post(handlers::complaints::begin_report_handler),
        )
        .route(
            "/api/complaints",
            post(handlers::complaints::submit_complaint_handler),
        )
        // Chats API
        .route("/api/chats", get(handlers::chats::list_chats_handler))
        .route(
            "/api/chats/hidden",
            get(handlers::chats::list_hidden_chats_handler),
        )
        .route(
            "/api/chats/open/:other_id",
            post(handlers::chats::open_chat_handler),
        )
        .route(
            "/api/chats/bulk-delete",
            post(handlers::chats::bulk_delete_handler),
        )
        .route(
            "/api/chats/bulk-mute",
            post(handlers::chats::bulk_mute_handler),
        )
        .route("/api/chats/ws", get(handlers::websocket::ws_handler))
        .route(
            "/api/chats/:chat_id",
            axum::routing::delete(handlers::chats::delete_chat_handler),
        )
        .route(
            "/api/chats/:chat_id/messages",
            get(handlers::chats::list_messages_handler).post(handlers::chats::send_message_handler),
        )
        .route(
            "/api/chats/:chat_id/seen",
            post(handlers::chats::mark_seen_handler),
        )
        .route(
            "/api/chats/:chat_id/hide",
            post(handlers::chats::hide_chat_handler),
        )
        .route(
            "/api/chats/:chat_id/unhide",
            post(handlers::chats::unhide_chat_handler),
        )
        // Account API
        .route(
            "/api/password-reset",
            post(handlers::account::password_reset_handler),
        )
        .route(
            "/api/settings/language",
            get(handlers::account::get_language_handler)
                .put(handlers::account::update_language_handler),
        )
        .with_state(state)
}
