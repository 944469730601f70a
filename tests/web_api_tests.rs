use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use sociable::storage::Storage;
use sociable::web::router::build_router;
use sociable::web::state::AppState;

async fn start_server() -> (String, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    let state = AppState::new(storage, Duration::from_millis(30));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("127.0.0.1:{}", addr.port()), shutdown_tx)
}

/// Blocking request returning status and JSON body, errors included.
fn call(method: &str, url: &str, user: Option<&str>, body: Option<Value>) -> (u16, Value) {
    let mut request = ureq::request(method, url);
    if let Some(user) = user {
        request = request.set("x-user-id", user);
    }
    let result = match body {
        Some(body) => request
            .set("Content-Type", "application/json")
            .send_string(&body.to_string()),
        None => request.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("transport error: {e}"),
    };
    let status = response.status();
    let text = response.into_string().expect("response body");
    let value = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, value)
}

async fn api(
    base: &str,
    method: &'static str,
    path: &str,
    user: Option<&'static str>,
    body: Option<Value>,
) -> (u16, Value) {
    let url = format!("http://{base}{path}");
    tokio::task::spawn_blocking(move || call(method, &url, user, body))
        .await
        .expect("request task")
}

async fn create_user(base: &str, id: &'static str, username: &str, private: bool) {
    let (status, body) = api(
        base,
        "PUT",
        &format!("/api/users/{id}"),
        Some(id),
        Some(json!({ "username": username, "first_name": username, "is_private": private })),
    )
    .await;
    assert_eq!(status, 200, "create {id}: {body}");
}

#[tokio::test]
async fn health_and_identity() {
    let (base, shutdown) = start_server().await;

    let (status, body) = api(&base, "GET", "/api/health", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, _) = api(&base, "GET", "/api/chats", None, None).await;
    assert_eq!(status, 401);

    create_user(&base, "ann", "ann", false).await;
    let (status, _) = api(
        &base,
        "PUT",
        "/api/users/ann",
        Some("bob"),
        Some(json!({ "username": "evil" })),
    )
    .await;
    assert_eq!(status, 403);

    shutdown.send(()).ok();
}

#[tokio::test]
async fn friendship_and_profile_flow() {
    let (base, shutdown) = start_server().await;
    create_user(&base, "ann", "ann", false).await;
    create_user(&base, "bob", "bob", true).await;

    let (status, body) = api(&base, "GET", "/api/profiles/bob", Some("ann"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["view"], "restricted");

    let (status, body) = api(
        &base,
        "POST",
        "/api/profiles/bob/friend-toggle",
        Some("ann"),
        Some(json!({ "context": "restricted" })),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["outcome"], "request_sent");
    assert_eq!(body["relationship"]["has_pending_outgoing_request"], true);

    let (status, body) = api(&base, "GET", "/api/friend-requests", Some("bob"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = api(&base, "POST", "/api/friend-requests/ann/accept", Some("bob"), None).await;
    assert_eq!(status, 200);

    let (status, body) = api(&base, "GET", "/api/profiles/bob", Some("ann"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["view"], "full");
    assert_eq!(body["relationship"]["is_friend"], true);

    let (status, body) = api(&base, "POST", "/api/profiles/bob/like", Some("ann"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["liked"], true);
    assert_eq!(body["like_count"], 1);
    let (_, body) = api(&base, "POST", "/api/profiles/bob/like", Some("ann"), None).await;
    assert_eq!(body["like_count"], 0);

    let (status, _) = api(&base, "GET", "/api/profiles/nobody", Some("ann"), None).await;
    assert_eq!(status, 404);

    let (status, body) = api(
        &base,
        "POST",
        "/api/complaints",
        Some("ann"),
        Some(json!({ "reported_id": "bob", "reason": "spam", "description": "ads" })),
    )
    .await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["reported_username"], "bob");

    shutdown.send(()).ok();
}

#[tokio::test]
async fn chat_flow_over_http() {
    let (base, shutdown) = start_server().await;
    create_user(&base, "ann", "ann", false).await;
    create_user(&base, "bob", "bob", false).await;

    let (status, body) = api(&base, "POST", "/api/chats/open/bob", Some("ann"), None).await;
    assert_eq!(status, 200);
    let chat_id = body["chat_id"].as_str().expect("chat id").to_string();
    assert_eq!(chat_id, sociable::chat_list::chat_id_for("ann", "bob"));

    let (status, _) = api(
        &base,
        "POST",
        &format!("/api/chats/{chat_id}/messages"),
        Some("bob"),
        Some(json!({ "text": "hey ann, how was the concert last night?" })),
    )
    .await;
    assert_eq!(status, 201);

    let (status, body) = api(&base, "GET", "/api/chats", Some("ann"), None).await;
    assert_eq!(status, 200);
    let chats = body["chats"].as_array().expect("chats");
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["unread"], 1);
    assert_eq!(chats[0]["last_message"]["preview"], "hey ann, how was the...");

    let (status, body) = api(&base, "POST", &format!("/api/chats/{chat_id}/seen"), Some("ann"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["updated"], 1);

    let (status, _) = api(
        &base,
        "POST",
        &format!("/api/chats/{chat_id}/hide"),
        Some("ann"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(status, 200);
    let (_, body) = api(&base, "GET", "/api/chats/hidden", Some("ann"), None).await;
    assert_eq!(body["chats"].as_array().map(Vec::len), Some(1));

    let (status, _) = api(
        &base,
        "POST",
        &format!("/api/chats/{chat_id}/unhide"),
        Some("ann"),
        Some(json!({ "password": "nope" })),
    )
    .await;
    assert_eq!(status, 401);
    let (status, _) = api(
        &base,
        "POST",
        &format!("/api/chats/{chat_id}/unhide"),
        Some("ann"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = api(
        &base,
        "POST",
        "/api/chats/bulk-mute",
        Some("ann"),
        Some(json!({ "chat_ids": [chat_id], "hours": 3 })),
    )
    .await;
    assert_eq!(status, 400);
    let (status, body) = api(
        &base,
        "POST",
        "/api/chats/bulk-mute",
        Some("ann"),
        Some(json!({ "chat_ids": [chat_id], "hours": 8 })),
    )
    .await;
    assert_eq!(status, 200, "{body}");

    let (status, _) = api(&base, "DELETE", &format!("/api/chats/{chat_id}"), Some("ann"), None).await;
    assert_eq!(status, 200);
    let (_, body) = api(&base, "GET", "/api/chats", Some("ann"), None).await;
    assert_eq!(body["chats"].as_array().map(Vec::len), Some(0));

    shutdown.send(()).ok();
}

#[tokio::test]
async fn account_endpoints() {
    let (base, shutdown) = start_server().await;

    let (status, body) = api(&base, "GET", "/api/settings/language", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["language"], "es");

    let (status, _) = api(
        &base,
        "PUT",
        "/api/settings/language",
        None,
        Some(json!({ "language": "pt" })),
    )
    .await;
    assert_eq!(status, 200);
    let (_, body) = api(&base, "GET", "/api/settings/language", None, None).await;
    assert_eq!(body["language"], "pt");

    let (status, _) = api(
        &base,
        "POST",
        "/api/password-reset",
        None,
        Some(json!({ "email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, 400);
    let (status, body) = api(
        &base,
        "POST",
        "/api/password-reset",
        None,
        Some(json!({ "email": "Ann@Example.com" })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["email"], "ann@example.com");

    shutdown.send(()).ok();
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("ws message in time")
            .expect("ws open")
            .expect("ws frame");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("ws json");
        }
    }
}

#[tokio::test]
async fn websocket_streams_chat_list() {
    let (base, shutdown) = start_server().await;
    create_user(&base, "ann", "ann", false).await;
    create_user(&base, "bob", "bob", false).await;
    let (_, body) = api(&base, "POST", "/api/chats/open/bob", Some("ann"), None).await;
    let chat_id = body["chat_id"].as_str().expect("chat id").to_string();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{base}/api/chats/ws?user_id=ann"))
        .await
        .expect("connect ws");

    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["entries"].as_array().map(Vec::len), Some(1));

    let (status, _) = api(
        &base,
        "POST",
        &format!("/api/chats/{chat_id}/messages"),
        Some("bob"),
        Some(json!({ "text": "ping" })),
    )
    .await;
    assert_eq!(status, 201);

    let diff = next_json(&mut ws).await;
    assert_eq!(diff["type"], "diff");
    assert_eq!(diff["upserted"][0]["chat_id"], chat_id);
    assert_eq!(diff["upserted"][0]["unread"], 1);

    drop(ws);
    shutdown.send(()).ok();
}
