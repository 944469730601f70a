use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone};

use sociable::chat_list::{
    chat_id_for, delete_chat, delete_chats, filter_by_username, hide_chat, list_chats,
    list_hidden_chats, list_messages, mark_seen, mute_chats, open_chat, send_message,
    unhide_chat, MuteDuration,
};
use sociable::error::SocialError;
use sociable::relationship::block_user;
use sociable::storage::{SharedStorage, Storage, UserRow};
use sociable::time_label::TimeLabel;
use sociable::watch::{watch_chats, ChatListUpdate};

const MINUTE: i64 = 60 * 1000;
const DAY: i64 = 24 * 60 * MINUTE;

fn user(id: &str, username: &str) -> UserRow {
    UserRow {
        id: id.to_string(),
        username: username.to_string(),
        ..Default::default()
    }
}

fn setup() -> Storage {
    let storage = Storage::open_in_memory().expect("open storage");
    for (id, name) in [("me", "maria"), ("ann", "ann"), ("bob", "bob"), ("cat", "cat")] {
        storage.upsert_user(&user(id, name)).expect("insert user");
    }
    storage
}

#[test]
fn unread_counts_reset_after_mark_seen() {
    let storage = setup();
    let chat = open_chat(&storage, "me", "ann", 1).unwrap();
    send_message(&storage, &chat, "ann", "one", 10).unwrap();
    send_message(&storage, &chat, "ann", "two", 20).unwrap();
    send_message(&storage, &chat, "me", "mine", 30).unwrap();

    let entries = list_chats(&storage, "me", 40).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].unread, 2);
    assert_eq!(entries[0].counterpart.username, "ann");
    assert_eq!(entries[0].last_message.as_ref().unwrap().preview, "mine");

    assert_eq!(mark_seen(&storage, &chat, "me").unwrap(), 2);
    assert_eq!(list_chats(&storage, "me", 50).unwrap()[0].unread, 0);
    // Ann has not seen mine.
    assert_eq!(list_chats(&storage, "ann", 50).unwrap()[0].unread, 1);
}

#[test]
fn deleted_chat_returns_only_on_newer_message() {
    let storage = setup();
    let chat = open_chat(&storage, "me", "ann", 1).unwrap();
    send_message(&storage, &chat, "ann", "hello", 10).unwrap();

    delete_chat(&storage, "me", &chat, 100).unwrap();
    assert!(list_chats(&storage, "me", 100).unwrap().is_empty());
    assert!(list_messages(&storage, &chat, "me").unwrap().is_empty());
    // The other side keeps the conversation.
    assert_eq!(list_chats(&storage, "ann", 100).unwrap().len(), 1);

    send_message(&storage, &chat, "ann", "are you there?", 200).unwrap();
    let entries = list_chats(&storage, "me", 200).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].unread, 1);
    let history = list_messages(&storage, &chat, "me").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text, "are you there?");
}

#[test]
fn hide_and_unhide_with_password() {
    let storage = setup();
    let chat = open_chat(&storage, "me", "ann", 1).unwrap();
    send_message(&storage, &chat, "ann", "secret stuff", 10).unwrap();

    assert!(matches!(
        hide_chat(&storage, "me", &chat, "", 20),
        Err(SocialError::Validation(_))
    ));
    hide_chat(&storage, "me", &chat, "hunter2", 20).unwrap();
    assert!(list_chats(&storage, "me", 30).unwrap().is_empty());
    assert_eq!(list_hidden_chats(&storage, "me", 30).unwrap().len(), 1);

    let hide = storage.get_chat_hide(&chat, "me").unwrap().unwrap();
    assert_ne!(hide.password_hash, "hunter2");
    assert!(!hide.password_hash.contains("hunter2"));

    assert!(matches!(
        unhide_chat(&storage, "me", &chat, "wrong"),
        Err(SocialError::WrongPassword)
    ));
    assert!(storage.get_chat_hide(&chat, "me").unwrap().is_some());
    assert!(list_chats(&storage, "me", 30).unwrap().is_empty());

    unhide_chat(&storage, "me", &chat, "hunter2").unwrap();
    assert!(storage.get_chat_hide(&chat, "me").unwrap().is_none());
    assert_eq!(list_chats(&storage, "me", 30).unwrap().len(), 1);
    assert!(list_hidden_chats(&storage, "me", 30).unwrap().is_empty());
}

#[test]
fn list_is_sorted_newest_first_and_filterable() {
    let storage = setup();
    let with_ann = open_chat(&storage, "me", "ann", 1).unwrap();
    let with_bob = open_chat(&storage, "me", "bob", 1).unwrap();
    let with_cat = open_chat(&storage, "me", "cat", 1).unwrap();
    send_message(&storage, &with_ann, "ann", "old", 10).unwrap();
    send_message(&storage, &with_bob, "bob", "new", 20).unwrap();

    let entries = list_chats(&storage, "me", 30).unwrap();
    let order: Vec<&str> = entries.iter().map(|e| e.chat_id.as_str()).collect();
    assert_eq!(order, vec![with_bob.as_str(), with_ann.as_str(), with_cat.as_str()]);

    let hits = filter_by_username(&entries, "BO");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chat_id, with_bob);
}

#[test]
fn bulk_delete_and_mute() {
    let storage = setup();
    let a = open_chat(&storage, "me", "ann", 1).unwrap();
    let b = open_chat(&storage, "me", "bob", 1).unwrap();

    assert!(matches!(
        MuteDuration::from_hours(3),
        Err(SocialError::Validation(_))
    ));
    let until = mute_chats(
        &storage,
        "me",
        &[a.clone(), b.clone()],
        MuteDuration::from_hours(4).unwrap(),
        1_000,
    )
    .unwrap();
    assert_eq!(until, 1_000 + 4 * 60 * MINUTE);
    assert!(list_chats(&storage, "me", 2_000).unwrap().iter().all(|e| e.muted));
    assert!(list_chats(&storage, "me", until + 1).unwrap().iter().all(|e| !e.muted));

    assert!(matches!(
        delete_chats(&storage, "me", &[], 5),
        Err(SocialError::Validation(_))
    ));
    delete_chats(&storage, "me", &[a, b], 5_000).unwrap();
    assert!(list_chats(&storage, "me", 6_000).unwrap().is_empty());
}

#[test]
fn chat_access_rules() {
    let storage = setup();
    let chat = open_chat(&storage, "me", "ann", 1).unwrap();
    assert_eq!(chat, chat_id_for("me", "ann"));
    assert_eq!(open_chat(&storage, "ann", "me", 2).unwrap(), chat);

    assert!(matches!(
        send_message(&storage, &chat, "bob", "hi", 3),
        Err(SocialError::Forbidden(_))
    ));
    assert!(matches!(
        send_message(&storage, &chat, "me", "   ", 3),
        Err(SocialError::Validation(_))
    ));
    assert!(matches!(
        send_message(&storage, "nope", "me", "hi", 3),
        Err(SocialError::NotFound(_))
    ));

    block_user(&storage, "me", "bob", 4).unwrap();
    assert!(matches!(
        open_chat(&storage, "me", "bob", 5),
        Err(SocialError::Blocked)
    ));
}

#[test]
fn same_username_pairs_get_separate_chats() {
    let storage = setup();
    storage.upsert_user(&user("bob2", "bob")).unwrap();

    let first = open_chat(&storage, "ann", "bob", 1).unwrap();
    send_message(&storage, &first, "ann", "secret for the first bob", 2).unwrap();
    let second = open_chat(&storage, "ann", "bob2", 3).unwrap();
    assert_ne!(first, second);

    assert_eq!(
        storage.list_participants(&first).unwrap(),
        vec!["ann".to_string(), "bob".to_string()]
    );
    assert_eq!(
        storage.list_participants(&second).unwrap(),
        vec!["ann".to_string(), "bob2".to_string()]
    );
    assert!(list_messages(&storage, &second, "bob2").unwrap().is_empty());
    assert!(matches!(
        list_messages(&storage, &first, "bob2"),
        Err(SocialError::Forbidden(_))
    ));

    for id in ["w", "x_y", "w_x", "y"] {
        storage.upsert_user(&user(id, id)).unwrap();
    }
    let left = open_chat(&storage, "w", "x_y", 4).unwrap();
    let right = open_chat(&storage, "w_x", "y", 4).unwrap();
    assert_ne!(left, right);
    assert_eq!(
        storage.list_participants(&right).unwrap(),
        vec!["w_x".to_string(), "y".to_string()]
    );
}

#[test]
fn labels_for_list_entries() {
    let storage = setup();
    let tz = FixedOffset::east_opt(0).unwrap();
    let now = tz
        .with_ymd_and_hms(2026, 10, 19, 18, 0, 0)
        .unwrap()
        .timestamp_millis();
    let today_1405 = tz
        .with_ymd_and_hms(2026, 10, 19, 14, 5, 0)
        .unwrap()
        .timestamp_millis();

    let a = open_chat(&storage, "me", "ann", 1).unwrap();
    let b = open_chat(&storage, "me", "bob", 1).unwrap();
    let c = open_chat(&storage, "me", "cat", 1).unwrap();
    send_message(&storage, &a, "ann", "today", today_1405).unwrap();
    send_message(&storage, &b, "bob", "last week", now - 8 * DAY).unwrap();
    send_message(&storage, &c, "cat", "a while ago", now - 15 * DAY).unwrap();

    let entries = list_chats(&storage, "me", now).unwrap();
    let labels: Vec<String> = entries
        .iter()
        .map(|e| e.time_label(now, &tz).unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["14:05", "1 week", "2 weeks"]);
    assert_eq!(
        entries[0].time_label(now, &tz),
        Some(TimeLabel::Clock { hour: 14, minute: 5 })
    );
}

fn shared(storage: Storage) -> SharedStorage {
    Arc::new(tokio::sync::Mutex::new(storage))
}

async fn next_update(sub: &mut sociable::watch::ChatListSubscription) -> ChatListUpdate {
    tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("update in time")
        .expect("watcher running")
}

#[tokio::test]
async fn watcher_sends_snapshot_then_coalesced_diff() {
    let storage = setup();
    let chat = open_chat(&storage, "me", "ann", 1).unwrap();
    let storage = shared(storage);

    let mut sub = watch_chats(storage.clone(), "me".to_string(), Duration::from_millis(50))
        .await
        .unwrap();
    match next_update(&mut sub).await {
        ChatListUpdate::Snapshot { entries } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].unread, 0);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    {
        let guard = storage.lock().await;
        send_message(&guard, &chat, "ann", "one", 10).unwrap();
        send_message(&guard, &chat, "ann", "two", 11).unwrap();
        send_message(&guard, &chat, "ann", "three", 12).unwrap();
    }

    match next_update(&mut sub).await {
        ChatListUpdate::Diff { upserted, removed } => {
            assert!(removed.is_empty());
            assert_eq!(upserted.len(), 1);
            assert_eq!(upserted[0].unread, 3);
            assert_eq!(upserted[0].last_message.as_ref().unwrap().preview, "three");
        }
        other => panic!("expected diff, got {other:?}"),
    }

    {
        let guard = storage.lock().await;
        delete_chat(&guard, "me", &chat, 100).unwrap();
    }
    match next_update(&mut sub).await {
        ChatListUpdate::Diff { upserted, removed } => {
            assert!(upserted.is_empty());
            assert_eq!(removed, vec![chat.clone()]);
        }
        other => panic!("expected diff, got {other:?}"),
    }
}

#[tokio::test]
async fn watcher_picks_up_new_chats_and_profile_changes() {
    let storage = shared(setup());
    let mut sub = watch_chats(storage.clone(), "me".to_string(), Duration::from_millis(30))
        .await
        .unwrap();
    assert_eq!(
        next_update(&mut sub).await,
        ChatListUpdate::Snapshot { entries: vec![] }
    );

    let chat = {
        let guard = storage.lock().await;
        open_chat(&guard, "bob", "me", 5).unwrap()
    };
    match next_update(&mut sub).await {
        ChatListUpdate::Diff { upserted, .. } => {
            assert_eq!(upserted.len(), 1);
            assert_eq!(upserted[0].chat_id, chat);
        }
        other => panic!("expected diff, got {other:?}"),
    }

    {
        let guard = storage.lock().await;
        guard.upsert_user(&user("bob", "robert")).unwrap();
    }
    match next_update(&mut sub).await {
        ChatListUpdate::Diff { upserted, .. } => {
            assert_eq!(upserted[0].counterpart.username, "robert");
        }
        other => panic!("expected diff, got {other:?}"),
    }
}

#[tokio::test]
async fn watcher_reports_when_a_mute_runs_out() {
    let storage = setup();
    let chat = open_chat(&storage, "me", "ann", 1).unwrap();
    storage
        .set_chat_mutes("me", &[chat.clone()], sociable::now_millis() + 200)
        .unwrap();
    let storage = shared(storage);

    let mut sub = watch_chats(storage.clone(), "me".to_string(), Duration::from_millis(20))
        .await
        .unwrap();
    match next_update(&mut sub).await {
        ChatListUpdate::Snapshot { entries } => assert!(entries[0].muted),
        other => panic!("expected snapshot, got {other:?}"),
    }

    // No write happens; the watcher wakes up on its own.
    match next_update(&mut sub).await {
        ChatListUpdate::Diff { upserted, removed } => {
            assert!(removed.is_empty());
            assert_eq!(upserted[0].chat_id, chat);
            assert!(!upserted[0].muted);
            assert_eq!(upserted[0].muted_until, None);
        }
        other => panic!("expected diff, got {other:?}"),
    }
}
