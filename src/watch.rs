//! Live chat list: an initial snapshot followed by incremental diffs.
//!
//! The watcher listens on the storage change feed, waits until a burst of
//! writes has been quiet for the settle interval, then re-resolves only the
//! chats that changed. It also wakes up when the earliest mute it knows of
//! runs out, since nothing is written then. Dropping the
//! [`ChatListSubscription`] stops it.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::chat_list::{list_chats, resolve_entry, sort_entries, ChatListEntry};
use crate::error::SocialResult;
use crate::logging;
use crate::storage::{SharedStorage, Storage, StoreChange};

/// Buffered updates per subscription before the watcher waits on the reader.
const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatListUpdate {
    /// The whole list, newest first.
    Snapshot { entries: Vec<ChatListEntry> },
    /// Entries that appeared or changed, and ids that left the list.
    Diff {
        upserted: Vec<ChatListEntry>,
        removed: Vec<String>,
    },
}

/// Handle to a running chat-list watcher.
pub struct ChatListSubscription {
    updates: mpsc::Receiver<ChatListUpdate>,
    task: JoinHandle<()>,
}

impl ChatListSubscription {
    /// Next update, or `None` once the watcher has stopped.
    pub async fn next(&mut self) -> Option<ChatListUpdate> {
        self.updates.recv().await
    }
}

impl Drop for ChatListSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What a burst of changes asks the watcher to redo.
#[derive(Default)]
struct Pending {
    chats: BTreeSet<String>,
    users: BTreeSet<String>,
    resnapshot: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.chats.is_empty() && self.users.is_empty() && !self.resnapshot
    }

    /// Fold one receive result in. Returns false once the feed is closed.
    fn absorb(&mut self, result: Result<StoreChange, broadcast::error::RecvError>) -> bool {
        match result {
            Ok(StoreChange::Chat { chat_id }) => {
                self.chats.insert(chat_id);
            }
            Ok(StoreChange::User { user_id }) => {
                self.users.insert(user_id);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                crate::slog!("watch: change feed lagged, skipped {n} changes");
                self.resnapshot = true;
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
        true
    }
}

/// Start watching `me`'s chat list. The first update is always a snapshot.
pub async fn watch_chats(
    shared: SharedStorage,
    me: String,
    settle: Duration,
) -> SocialResult<ChatListSubscription> {
    let (changes, snapshot) = {
        let storage = shared.lock().await;
        // Subscribe before reading so no write falls between the two.
        let changes = storage.subscribe();
        (changes, list_chats(&storage, &me, crate::now_millis())?)
    };

    let (tx, updates) = mpsc::channel(UPDATE_BUFFER);
    let known: HashMap<String, ChatListEntry> = snapshot
        .iter()
        .map(|e| (e.chat_id.clone(), e.clone()))
        .collect();
    // The buffer is empty, so this cannot fail.
    let _ = tx.try_send(ChatListUpdate::Snapshot { entries: snapshot });

    crate::slog!("watch: started for {}", logging::user_id(&me));
    let task = tokio::spawn(run_watcher(shared, me, settle, changes, tx, known));
    Ok(ChatListSubscription { updates, task })
}

async fn run_watcher(
    shared: SharedStorage,
    me: String,
    settle: Duration,
    mut changes: broadcast::Receiver<StoreChange>,
    tx: mpsc::Sender<ChatListUpdate>,
    mut known: HashMap<String, ChatListEntry>,
) {
    loop {
        let mut pending = Pending::default();
        let open = match next_mute_expiry(&known, crate::now_millis()) {
            Some(delay) => tokio::select! {
                result = changes.recv() => pending.absorb(result),
                _ = tokio::time::sleep(delay) => {
                    pending.chats.extend(expired_mutes(&known, crate::now_millis()));
                    true
                }
            },
            None => pending.absorb(changes.recv().await),
        };
        if !open {
            break;
        }
        // Debounce: keep collecting until the feed is quiet for `settle`.
        let mut open = true;
        while let Ok(result) = tokio::time::timeout(settle, changes.recv()).await {
            if !pending.absorb(result) {
                open = false;
                break;
            }
        }
        if !pending.is_empty() {
            let update = {
                let storage = shared.lock().await;
                reconcile(&storage, &me, &mut known, pending)
            };
            match update {
                Ok(Some(update)) => {
                    if tx.send(update).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => crate::slog!("watch: refresh for {} failed: {}", logging::user_id(&me), e),
            }
        }
        if !open {
            break;
        }
    }
    crate::slog!("watch: stopped for {}", logging::user_id(&me));
}

/// Time until the earliest known mute ends.
fn next_mute_expiry(known: &HashMap<String, ChatListEntry>, now: i64) -> Option<Duration> {
    known
        .values()
        .filter_map(|e| e.muted_until)
        .min()
        .map(|until| Duration::from_millis(until.saturating_sub(now).max(0) as u64 + 1))
}

/// Chats whose mute has ended by `now`.
fn expired_mutes(known: &HashMap<String, ChatListEntry>, now: i64) -> Vec<String> {
    known
        .values()
        .filter(|e| e.muted_until.is_some_and(|until| until <= now))
        .map(|e| e.chat_id.clone())
        .collect()
}

/// Apply a burst of changes to `known` and describe the result.
fn reconcile(
    storage: &Storage,
    me: &str,
    known: &mut HashMap<String, ChatListEntry>,
    pending: Pending,
) -> SocialResult<Option<ChatListUpdate>> {
    let now = crate::now_millis();
    if pending.resnapshot {
        let entries = list_chats(storage, me, now)?;
        *known = entries
            .iter()
            .map(|e| (e.chat_id.clone(), e.clone()))
            .collect();
        return Ok(Some(ChatListUpdate::Snapshot { entries }));
    }

    let mut chats = pending.chats;
    // A profile change only matters for chats where that user is the counterpart.
    for entry in known.values() {
        if pending.users.contains(&entry.counterpart.id) {
            chats.insert(entry.chat_id.clone());
        }
    }

    let mut upserted = Vec::new();
    let mut removed = Vec::new();
    for chat_id in chats {
        match resolve_entry(storage, me, &chat_id, now)? {
            Some(entry) => {
                if known.get(&chat_id) != Some(&entry) {
                    known.insert(chat_id, entry.clone());
                    upserted.push(entry);
                }
            }
            None => {
                if known.remove(&chat_id).is_some() {
                    removed.push(chat_id);
                }
            }
        }
    }
    if upserted.is_empty() && removed.is_empty() {
        return Ok(None);
    }
    sort_entries(&mut upserted);
    Ok(Some(ChatListUpdate::Diff { upserted, removed }))
}
