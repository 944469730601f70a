//! SQLite storage layer for sociable.
//!
//! Plays the part of the document store: point lookups, filtered scans,
//! ordered/limited queries, merge updates, set-valued add/remove and atomic
//! multi-row writes. Every chat, message or user write is also published on a
//! broadcast change feed so callers can hold a live query open (see
//! [`crate::watch`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the change feed. Slow subscribers that fall further behind
/// than this see `RecvError::Lagged` and must resnapshot.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Serde(serde_json::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// A write that touched a watched document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreChange {
    Chat { chat_id: String },
    User { user_id: String },
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    #[serde(default)]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
    /// Maintained only by the like/unlike transactions.
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub first_hobby: String,
    #[serde(default)]
    pub second_hobby: String,
    #[serde(default)]
    pub first_interest: String,
    #[serde(default)]
    pub second_interest: String,
    #[serde(default)]
    pub relationship_status: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Pending friend request, stored under the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestRow {
    pub id: i64,
    pub from_id: String,
    pub to_id: String,
    pub from_name: String,
    pub from_image: String,
    /// Always "pending" while the row exists.
    pub status: String,
    pub created_at: i64,
}

/// Like edge, stored under the liked user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeRow {
    pub liker_id: String,
    pub target_id: String,
    pub username: String,
    pub user_image: String,
    pub created_at: i64,
}

/// Mirror of a like in the liker's "Likes" category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeCategoryRow {
    pub owner_id: String,
    pub target_id: String,
    pub image: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    /// "like"
    pub kind: String,
    pub from_id: String,
    pub from_name: String,
    pub from_image: String,
    pub message: String,
    pub created_at: i64,
}

/// Short-lived profile event. `date` is the picker's `"D Mon"` text and
/// `event_on` the calendar day it was resolved to when the event was added.
/// Rows written before `event_on` existed carry `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub event_on: Option<NaiveDate>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRow {
    pub id: String,
    pub created_at: i64,
    pub last_message_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: i64,
}

/// Per-user password hide on a chat. Only a salted digest is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHideRow {
    pub chat_id: String,
    pub user_id: String,
    pub salt: String,
    pub password_hash: String,
    pub hidden_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintRow {
    pub id: i64,
    pub reporter_id: String,
    pub reporter_name: String,
    pub reporter_username: String,
    pub reported_id: String,
    pub reported_name: String,
    pub reported_username: String,
    pub reason: String,
    pub description: String,
    pub created_at: i64,
}

/// Queued reset mail for the external auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRow {
    pub id: i64,
    pub email: String,
    pub requested_at: i64,
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Storage shared between request handlers and chat-list watchers.
pub type SharedStorage = Arc<tokio::sync::Mutex<Storage>>;

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
    changes: broadcast::Sender<StoreChange>,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let storage = Self { conn, changes };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Subscribe to the change feed. Only writes made after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: StoreChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }

    fn publish_chat(&self, chat_id: &str) {
        self.publish(StoreChange::Chat {
            chat_id: chat_id.to_string(),
        });
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL,
                first_name          TEXT NOT NULL DEFAULT '',
                last_name           TEXT NOT NULL DEFAULT '',
                email               TEXT,
                photo_urls          TEXT NOT NULL DEFAULT '[]',
                is_private          INTEGER NOT NULL DEFAULT 0,
                like_count          INTEGER NOT NULL DEFAULT 0,
                first_hobby         TEXT NOT NULL DEFAULT '',
                second_hobby        TEXT NOT NULL DEFAULT '',
                first_interest      TEXT NOT NULL DEFAULT '',
                second_interest     TEXT NOT NULL DEFAULT '',
                relationship_status TEXT NOT NULL DEFAULT '',
                created_at          INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS friends (
                owner_id    TEXT NOT NULL,
                friend_id   TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (owner_id, friend_id)
            );

            CREATE TABLE IF NOT EXISTS friend_requests (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id     TEXT NOT NULL,
                to_id       TEXT NOT NULL,
                from_name   TEXT NOT NULL,
                from_image  TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  INTEGER NOT NULL,
                UNIQUE (from_id, to_id)
            );

            CREATE TABLE IF NOT EXISTS likes (
                liker_id    TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                username    TEXT NOT NULL,
                user_image  TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (liker_id, target_id)
            );

            CREATE TABLE IF NOT EXISTS like_category (
                owner_id    TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                image       TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (owner_id, target_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                kind        TEXT NOT NULL,
                from_id     TEXT NOT NULL,
                from_name   TEXT NOT NULL,
                from_image  TEXT NOT NULL,
                message     TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS hidden_stories (
                user_id     TEXT NOT NULL,
                hidden_id   TEXT NOT NULL,
                PRIMARY KEY (user_id, hidden_id)
            );

            CREATE TABLE IF NOT EXISTS hide_stories_from (
                user_id     TEXT NOT NULL,
                viewer_id   TEXT NOT NULL,
                PRIMARY KEY (user_id, viewer_id)
            );

            CREATE TABLE IF NOT EXISTS blocked_users (
                owner_id    TEXT NOT NULL,
                blocked_id  TEXT NOT NULL,
                blocked_at  INTEGER NOT NULL,
                PRIMARY KEY (owner_id, blocked_id)
            );

            CREATE TABLE IF NOT EXISTS events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                date        TEXT NOT NULL,
                event_on    TEXT,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chats (
                id              TEXT PRIMARY KEY,
                created_at      INTEGER NOT NULL,
                last_message_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS chat_participants (
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                user_id     TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_chat_participants_user
                ON chat_participants(user_id);

            CREATE TABLE IF NOT EXISTS chat_deletions (
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                user_id     TEXT NOT NULL,
                deleted_at  INTEGER NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS chat_hides (
                chat_id         TEXT NOT NULL REFERENCES chats(id),
                user_id         TEXT NOT NULL,
                salt            TEXT NOT NULL,
                password_hash   TEXT NOT NULL,
                hidden_at       INTEGER NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS chat_mutes (
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                user_id     TEXT NOT NULL,
                muted_until INTEGER NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                sender_id   TEXT NOT NULL,
                text        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_chat
                ON messages(chat_id, created_at);

            CREATE TABLE IF NOT EXISTS message_seen (
                message_id  TEXT NOT NULL REFERENCES messages(id),
                user_id     TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS message_deletions (
                message_id  TEXT NOT NULL REFERENCES messages(id),
                user_id     TEXT NOT NULL,
                deleted_at  INTEGER NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS complaints (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id         TEXT NOT NULL,
                reporter_name       TEXT NOT NULL,
                reporter_username   TEXT NOT NULL,
                reported_id         TEXT NOT NULL,
                reported_name       TEXT NOT NULL,
                reported_username   TEXT NOT NULL,
                reason              TEXT NOT NULL,
                description         TEXT NOT NULL,
                created_at          INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS password_reset_outbox (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                email           TEXT NOT NULL,
                requested_at    INTEGER NOT NULL,
                delivered       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS settings (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );
            ",
        )?;

        // Databases created before events carried a resolved date.
        let has_event_on = self
            .conn
            .prepare("SELECT event_on FROM events LIMIT 0")
            .is_ok();
        if !has_event_on {
            self.conn
                .execute_batch("ALTER TABLE events ADD COLUMN event_on TEXT;")?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert or merge-update a user. `like_count` and `created_at` are kept
    /// from the existing row.
    pub fn upsert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        let photos = serde_json::to_string(&row.photo_urls)?;
        self.conn.execute(
            "INSERT INTO users (id, username, first_name, last_name, email, photo_urls,
                                is_private, like_count, first_hobby, second_hobby,
                                first_interest, second_interest, relationship_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                photo_urls = excluded.photo_urls,
                is_private = excluded.is_private,
                first_hobby = excluded.first_hobby,
                second_hobby = excluded.second_hobby,
                first_interest = excluded.first_interest,
                second_interest = excluded.second_interest,
                relationship_status = excluded.relationship_status",
            params![
                row.id,
                row.username,
                row.first_name,
                row.last_name,
                row.email,
                photos,
                row.is_private as i32,
                row.first_hobby,
                row.second_hobby,
                row.first_interest,
                row.second_interest,
                row.relationship_status,
                row.created_at,
            ],
        )?;
        self.publish(StoreChange::User {
            user_id: row.id.clone(),
        });
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, first_name, last_name, email, photo_urls, is_private,
                        like_count, first_hobby, second_hobby, first_interest,
                        second_interest, relationship_status, created_at
                 FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                            email: row.get(4)?,
                            photo_urls: Vec::new(),
                            is_private: row.get::<_, i32>(6)? != 0,
                            like_count: row.get::<_, i64>(7)?.max(0) as u32,
                            first_hobby: row.get(8)?,
                            second_hobby: row.get(9)?,
                            first_interest: row.get(10)?,
                            second_interest: row.get(11)?,
                            relationship_status: row.get(12)?,
                            created_at: row.get(13)?,
                        },
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((mut user, photos)) => {
                user.photo_urls = serde_json::from_str(&photos)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    pub fn user_exists(&self, id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Friendship edges
    // -----------------------------------------------------------------------

    pub fn list_friend_ids(&self, owner_id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT friend_id FROM friends WHERE owner_id = ?1")?;
        let rows = stmt.query_map(params![owner_id], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Whether the edge `owner_id -> friend_id` exists.
    pub fn has_friend_edge(&self, owner_id: &str, friend_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM friends WHERE owner_id = ?1 AND friend_id = ?2",
            params![owner_id, friend_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_friends(&self, owner_id: &str) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM friends WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Write both edges of a friendship atomically.
    pub fn insert_friendship(&self, a: &str, b: &str, now: i64) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for (owner, friend) in [(a, b), (b, a)] {
            tx.execute(
                "INSERT OR IGNORE INTO friends (owner_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![owner, friend, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove both edges of a friendship atomically. Returns the number of
    /// edges removed (0, 1 or 2).
    pub fn delete_friendship(&self, a: &str, b: &str) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM friends
             WHERE (owner_id = ?1 AND friend_id = ?2) OR (owner_id = ?2 AND friend_id = ?1)",
            params![a, b],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Friend requests
    // -----------------------------------------------------------------------

    pub fn insert_friend_request(&self, row: &FriendRequestRow) -> Result<i64, StorageError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO friend_requests
                (from_id, to_id, from_name, from_image, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.from_id,
                row.to_id,
                row.from_name,
                row.from_image,
                row.status,
                row.created_at,
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "friend request {} -> {}",
                row.from_id, row.to_id
            )));
        }
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_friend_request(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> Result<Option<FriendRequestRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, from_id, to_id, from_name, from_image, status, created_at
                 FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
                params![from_id, to_id],
                friend_request_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Requests waiting on `to_id`, newest first.
    pub fn list_incoming_friend_requests(
        &self,
        to_id: &str,
    ) -> Result<Vec<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_id, to_id, from_name, from_image, status, created_at
             FROM friend_requests WHERE to_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![to_id], friend_request_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn delete_friend_request(&self, from_id: &str, to_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
            params![from_id, to_id],
        )?;
        Ok(affected > 0)
    }

    /// Consume the request `from_id -> to_id` and write both friendship edges
    /// in one transaction. Returns false when no such request exists.
    pub fn accept_friend_request(
        &self,
        from_id: &str,
        to_id: &str,
        now: i64,
    ) -> Result<bool, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
            params![from_id, to_id],
        )?;
        if removed == 0 {
            return Ok(false);
        }
        for (owner, friend) in [(from_id, to_id), (to_id, from_id)] {
            tx.execute(
                "INSERT OR IGNORE INTO friends (owner_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![owner, friend, now],
            )?;
        }
        // A crossed request in the other direction is moot now.
        tx.execute(
            "DELETE FROM friend_requests WHERE from_id = ?1 AND to_id = ?2",
            params![to_id, from_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Likes
    // -----------------------------------------------------------------------

    pub fn has_like(&self, liker_id: &str, target_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE liker_id = ?1 AND target_id = ?2",
            params![liker_id, target_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Like edge, category mirror, counter increment and notification, all
    /// or nothing. Returns the target's new like count.
    pub fn insert_like(
        &self,
        like: &LikeRow,
        mirror: &LikeCategoryRow,
        notification: &NotificationRow,
    ) -> Result<u32, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO likes (liker_id, target_id, username, user_image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                like.liker_id,
                like.target_id,
                like.username,
                like.user_image,
                like.created_at,
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!(
                "like {} -> {}",
                like.liker_id, like.target_id
            )));
        }
        tx.execute(
            "INSERT OR REPLACE INTO like_category (owner_id, target_id, image, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                mirror.owner_id,
                mirror.target_id,
                mirror.image,
                mirror.created_at
            ],
        )?;
        tx.execute(
            "UPDATE users SET like_count = like_count + 1 WHERE id = ?1",
            params![like.target_id],
        )?;
        tx.execute(
            "INSERT INTO notifications
                (user_id, kind, from_id, from_name, from_image, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                notification.user_id,
                notification.kind,
                notification.from_id,
                notification.from_name,
                notification.from_image,
                notification.message,
                notification.created_at,
            ],
        )?;
        let count: i64 = tx.query_row(
            "SELECT like_count FROM users WHERE id = ?1",
            params![like.target_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(count.max(0) as u32)
    }

    /// Remove a like edge and its mirror and decrement the counter, floored
    /// at zero. Returns the target's new like count.
    pub fn delete_like(&self, liker_id: &str, target_id: &str) -> Result<u32, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM likes WHERE liker_id = ?1 AND target_id = ?2",
            params![liker_id, target_id],
        )?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!(
                "like {liker_id} -> {target_id}"
            )));
        }
        tx.execute(
            "DELETE FROM like_category WHERE owner_id = ?1 AND target_id = ?2",
            params![liker_id, target_id],
        )?;
        tx.execute(
            "UPDATE users SET like_count = MAX(like_count - 1, 0) WHERE id = ?1",
            params![target_id],
        )?;
        let count: i64 = tx.query_row(
            "SELECT like_count FROM users WHERE id = ?1",
            params![target_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(count.max(0) as u32)
    }

    pub fn list_like_category(&self, owner_id: &str) -> Result<Vec<LikeCategoryRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, target_id, image, created_at
             FROM like_category WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(LikeCategoryRow {
                owner_id: row.get(0)?,
                target_id: row.get(1)?,
                image: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, kind, from_id, from_name, from_image, message, created_at
             FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(NotificationRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                from_id: row.get(3)?,
                from_name: row.get(4)?,
                from_image: row.get(5)?,
                message: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Story visibility (set-valued relations)
    // -----------------------------------------------------------------------

    /// Add or remove `hidden_id` from `user_id`'s hidden-stories set.
    pub fn set_hidden_story(
        &self,
        user_id: &str,
        hidden_id: &str,
        hidden: bool,
    ) -> Result<(), StorageError> {
        if hidden {
            self.conn.execute(
                "INSERT OR IGNORE INTO hidden_stories (user_id, hidden_id) VALUES (?1, ?2)",
                params![user_id, hidden_id],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM hidden_stories WHERE user_id = ?1 AND hidden_id = ?2",
                params![user_id, hidden_id],
            )?;
        }
        Ok(())
    }

    pub fn is_story_hidden(&self, user_id: &str, hidden_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM hidden_stories WHERE user_id = ?1 AND hidden_id = ?2",
            params![user_id, hidden_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Hide (or stop hiding) `user_id`'s stories from `viewer_id`. Updates
    /// both sides of the relation in one transaction.
    pub fn set_hide_my_stories(
        &self,
        user_id: &str,
        viewer_id: &str,
        hidden: bool,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        if hidden {
            tx.execute(
                "INSERT OR IGNORE INTO hide_stories_from (user_id, viewer_id) VALUES (?1, ?2)",
                params![user_id, viewer_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO hidden_stories (user_id, hidden_id) VALUES (?1, ?2)",
                params![viewer_id, user_id],
            )?;
        } else {
            tx.execute(
                "DELETE FROM hide_stories_from WHERE user_id = ?1 AND viewer_id = ?2",
                params![user_id, viewer_id],
            )?;
            tx.execute(
                "DELETE FROM hidden_stories WHERE user_id = ?1 AND hidden_id = ?2",
                params![viewer_id, user_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn is_hiding_stories_from(
        &self,
        user_id: &str,
        viewer_id: &str,
    ) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM hide_stories_from WHERE user_id = ?1 AND viewer_id = ?2",
            params![user_id, viewer_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    pub fn insert_block(&self, owner_id: &str, blocked_id: &str, now: i64) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO blocked_users (owner_id, blocked_id, blocked_at)
             VALUES (?1, ?2, ?3)",
            params![owner_id, blocked_id, now],
        )?;
        Ok(())
    }

    pub fn is_blocked(&self, owner_id: &str, blocked_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM blocked_users WHERE owner_id = ?1 AND blocked_id = ?2",
            params![owner_id, blocked_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn insert_event(&self, row: &EventRow) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO events (user_id, title, date, event_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.user_id, row.title, row.date, row.event_on, row.created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_events(&self, user_id: &str) -> Result<Vec<EventRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, date, event_on, created_at
             FROM events WHERE user_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                date: row.get(3)?,
                event_on: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn delete_event(&self, id: i64) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Chats
    // -----------------------------------------------------------------------

    /// Create a chat between `participants`. Returns `false` when it already
    /// exists with exactly these participants; any other existing member set
    /// is an `AlreadyExists` error and nothing is written.
    pub fn insert_chat(&self, id: &str, participants: &[&str], now: i64) -> Result<bool, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let created = tx.execute(
            "INSERT OR IGNORE INTO chats (id, created_at, last_message_at) VALUES (?1, ?2, NULL)",
            params![id, now],
        )?;
        if created == 0 {
            let mut existing = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY user_id",
                )?;
                let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
                for row in rows {
                    existing.push(row?);
                }
            }
            let mut requested: Vec<String> = participants.iter().map(|p| p.to_string()).collect();
            requested.sort();
            requested.dedup();
            if existing != requested {
                return Err(StorageError::AlreadyExists(format!(
                    "chat {id} belongs to other participants"
                )));
            }
            return Ok(false);
        }
        for user_id in participants {
            tx.execute(
                "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                params![id, user_id],
            )?;
        }
        tx.commit()?;
        if created > 0 {
            self.publish_chat(id);
        }
        Ok(created > 0)
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, created_at, last_message_at FROM chats WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        last_message_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Chats containing `user_id`.
    pub fn list_chat_ids_for(&self, user_id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT chat_id FROM chat_participants WHERE user_id = ?1 ORDER BY chat_id")?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn list_participants(&self, chat_id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![chat_id], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Append a message, advance the chat's last-message time, and lift any
    /// per-user deletion older than the message. Returns the users whose
    /// deleted chat became visible again.
    pub fn insert_message(&self, row: &MessageRow) -> Result<Vec<String>, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO messages (id, chat_id, sender_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id, row.chat_id, row.sender_id, row.text, row.created_at],
        )?;
        tx.execute(
            "UPDATE chats SET last_message_at = MAX(COALESCE(last_message_at, ?2), ?2)
             WHERE id = ?1",
            params![row.chat_id, row.created_at],
        )?;
        let restored = {
            let mut stmt = tx.prepare(
                "SELECT user_id FROM chat_deletions WHERE chat_id = ?1 AND deleted_at < ?2",
            )?;
            let rows = stmt.query_map(params![row.chat_id, row.created_at], |r| r.get(0))?;
            let mut result: Vec<String> = Vec::new();
            for r in rows {
                result.push(r?);
            }
            result
        };
        tx.execute(
            "DELETE FROM chat_deletions WHERE chat_id = ?1 AND deleted_at < ?2",
            params![row.chat_id, row.created_at],
        )?;
        tx.commit()?;
        self.publish_chat(&row.chat_id);
        Ok(restored)
    }

    /// Most recent message of a chat not deleted for `viewer_id`.
    pub fn last_message(
        &self,
        chat_id: &str,
        viewer_id: &str,
    ) -> Result<Option<MessageRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT m.id, m.chat_id, m.sender_id, m.text, m.created_at
                 FROM messages m
                 WHERE m.chat_id = ?1
                   AND NOT EXISTS (SELECT 1 FROM message_deletions d
                                   WHERE d.message_id = m.id AND d.user_id = ?2)
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT 1",
                params![chat_id, viewer_id],
                message_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Messages of a chat not deleted for `viewer_id`, oldest first.
    pub fn list_messages(
        &self,
        chat_id: &str,
        viewer_id: &str,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.chat_id, m.sender_id, m.text, m.created_at
             FROM messages m
             WHERE m.chat_id = ?1
               AND NOT EXISTS (SELECT 1 FROM message_deletions d
                               WHERE d.message_id = m.id AND d.user_id = ?2)
             ORDER BY m.created_at, m.id",
        )?;
        let rows = stmt.query_map(params![chat_id, viewer_id], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Messages from others that `viewer_id` has not seen.
    pub fn count_unread(&self, chat_id: &str, viewer_id: &str) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages m
             WHERE m.chat_id = ?1
               AND m.sender_id != ?2
               AND NOT EXISTS (SELECT 1 FROM message_seen s
                               WHERE s.message_id = m.id AND s.user_id = ?2)
               AND NOT EXISTS (SELECT 1 FROM message_deletions d
                               WHERE d.message_id = m.id AND d.user_id = ?2)",
            params![chat_id, viewer_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Add `viewer_id` to the seen set of every message it did not author.
    /// Returns how many messages changed.
    pub fn mark_seen(&self, chat_id: &str, viewer_id: &str) -> Result<usize, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO message_seen (message_id, user_id)
             SELECT m.id, ?2 FROM messages m
             WHERE m.chat_id = ?1 AND m.sender_id != ?2",
            params![chat_id, viewer_id],
        )?;
        if affected > 0 {
            self.publish_chat(chat_id);
        }
        Ok(affected)
    }

    pub fn seen_by(&self, message_id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM message_seen WHERE message_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![message_id], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_chat_deletion(&self, chat_id: &str, user_id: &str) -> Result<Option<i64>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT deleted_at FROM chat_deletions WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    /// Soft-delete chats for one user: mark each chat and every one of its
    /// messages, all in a single transaction.
    pub fn soft_delete_chats(
        &self,
        user_id: &str,
        chat_ids: &[String],
        now: i64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for chat_id in chat_ids {
            tx.execute(
                "INSERT OR REPLACE INTO chat_deletions (chat_id, user_id, deleted_at)
                 VALUES (?1, ?2, ?3)",
                params![chat_id, user_id, now],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO message_deletions (message_id, user_id, deleted_at)
                 SELECT id, ?2, ?3 FROM messages WHERE chat_id = ?1",
                params![chat_id, user_id, now],
            )?;
        }
        tx.commit()?;
        for chat_id in chat_ids {
            self.publish_chat(chat_id);
        }
        Ok(())
    }

    pub fn get_chat_hide(&self, chat_id: &str, user_id: &str) -> Result<Option<ChatHideRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT chat_id, user_id, salt, password_hash, hidden_at
                 FROM chat_hides WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
                |row| {
                    Ok(ChatHideRow {
                        chat_id: row.get(0)?,
                        user_id: row.get(1)?,
                        salt: row.get(2)?,
                        password_hash: row.get(3)?,
                        hidden_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_chat_hide(&self, row: &ChatHideRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO chat_hides (chat_id, user_id, salt, password_hash, hidden_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.chat_id, row.user_id, row.salt, row.password_hash, row.hidden_at],
        )?;
        self.publish_chat(&row.chat_id);
        Ok(())
    }

    pub fn delete_chat_hide(&self, chat_id: &str, user_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM chat_hides WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id, user_id],
        )?;
        if affected > 0 {
            self.publish_chat(chat_id);
        }
        Ok(affected > 0)
    }

    /// Mute chats for one user until `until`, in one transaction.
    pub fn set_chat_mutes(
        &self,
        user_id: &str,
        chat_ids: &[String],
        until: i64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for chat_id in chat_ids {
            tx.execute(
                "INSERT OR REPLACE INTO chat_mutes (chat_id, user_id, muted_until)
                 VALUES (?1, ?2, ?3)",
                params![chat_id, user_id, until],
            )?;
        }
        tx.commit()?;
        for chat_id in chat_ids {
            self.publish_chat(chat_id);
        }
        Ok(())
    }

    pub fn get_chat_mute(&self, chat_id: &str, user_id: &str) -> Result<Option<i64>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT muted_until FROM chat_mutes WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    // -----------------------------------------------------------------------
    // Complaints (append only)
    // -----------------------------------------------------------------------

    pub fn insert_complaint(&self, row: &ComplaintRow) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO complaints
                (reporter_id, reporter_name, reporter_username, reported_id, reported_name,
                 reported_username, reason, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.reporter_id,
                row.reporter_name,
                row.reporter_username,
                row.reported_id,
                row.reported_name,
                row.reported_username,
                row.reason,
                row.description,
                row.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_complaints_against(&self, reported_id: &str) -> Result<Vec<ComplaintRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reporter_id, reporter_name, reporter_username, reported_id,
                    reported_name, reported_username, reason, description, created_at
             FROM complaints WHERE reported_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![reported_id], |row| {
            Ok(ComplaintRow {
                id: row.get(0)?,
                reporter_id: row.get(1)?,
                reporter_name: row.get(2)?,
                reporter_username: row.get(3)?,
                reported_id: row.get(4)?,
                reported_name: row.get(5)?,
                reported_username: row.get(6)?,
                reason: row.get(7)?,
                description: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Password reset outbox
    // -----------------------------------------------------------------------

    pub fn insert_password_reset(&self, email: &str, now: i64) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO password_reset_outbox (email, requested_at, delivered)
             VALUES (?1, ?2, 0)",
            params![email, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_pending_password_resets(&self) -> Result<Vec<PasswordResetRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, requested_at, delivered
             FROM password_reset_outbox WHERE delivered = 0 ORDER BY requested_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PasswordResetRow {
                id: row.get(0)?,
                email: row.get(1)?,
                requested_at: row.get(2)?,
                delivered: row.get::<_, i32>(3)? != 0,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn mark_password_reset_delivered(&self, id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE password_reset_outbox SET delivered = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn friend_request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        from_name: row.get(3)?,
        from_image: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Database file inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sociable.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn user(id: &str, username: &str) -> UserRow {
        UserRow {
            id: id.to_string(),
            username: username.to_string(),
            first_name: "First".to_string(),
            last_name: "Last".to_string(),
            photo_urls: vec![format!("https://img.example/{id}.jpg")],
            created_at: 1,
            ..Default::default()
        }
    }

    fn message(id: &str, chat_id: &str, sender: &str, at: i64) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender.to_string(),
            text: format!("text {id}"),
            created_at: at,
        }
    }

    #[test]
    fn test_user_roundtrip_and_merge_keeps_like_count() {
        let storage = test_storage();
        storage.upsert_user(&user("u1", "ann")).unwrap();
        storage.upsert_user(&user("u2", "bob")).unwrap();

        let like = LikeRow {
            liker_id: "u2".to_string(),
            target_id: "u1".to_string(),
            username: "bob".to_string(),
            user_image: String::new(),
            created_at: 5,
        };
        let mirror = LikeCategoryRow {
            owner_id: "u2".to_string(),
            target_id: "u1".to_string(),
            image: String::new(),
            created_at: 5,
        };
        let note = NotificationRow {
            id: 0,
            user_id: "u1".to_string(),
            kind: "like".to_string(),
            from_id: "u2".to_string(),
            from_name: "bob".to_string(),
            from_image: String::new(),
            message: "bob liked your profile".to_string(),
            created_at: 5,
        };
        assert_eq!(storage.insert_like(&like, &mirror, &note).unwrap(), 1);

        let mut updated = user("u1", "ann2");
        updated.like_count = 99;
        storage.upsert_user(&updated).unwrap();

        let loaded = storage.get_user("u1").unwrap().unwrap();
        assert_eq!(loaded.username, "ann2");
        assert_eq!(loaded.like_count, 1);
        assert_eq!(loaded.photo_urls, vec!["https://img.example/u1.jpg"]);
        assert!(storage.user_exists("u1").unwrap());
        assert!(!storage.user_exists("nope").unwrap());
    }

    #[test]
    fn test_friendship_edges_are_written_and_removed_together() {
        let storage = test_storage();
        storage.insert_friendship("a", "b", 1).unwrap();
        assert!(storage.has_friend_edge("a", "b").unwrap());
        assert!(storage.has_friend_edge("b", "a").unwrap());
        assert_eq!(storage.delete_friendship("b", "a").unwrap(), 2);
        assert!(!storage.has_friend_edge("a", "b").unwrap());
        assert!(!storage.has_friend_edge("b", "a").unwrap());
    }

    #[test]
    fn test_duplicate_friend_request_rejected() {
        let storage = test_storage();
        let row = FriendRequestRow {
            id: 0,
            from_id: "a".to_string(),
            to_id: "b".to_string(),
            from_name: "ann".to_string(),
            from_image: String::new(),
            status: "pending".to_string(),
            created_at: 1,
        };
        storage.insert_friend_request(&row).unwrap();
        assert!(matches!(
            storage.insert_friend_request(&row),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(storage.list_incoming_friend_requests("b").unwrap().len(), 1);
    }

    #[test]
    fn test_accept_friend_request_consumes_request() {
        let storage = test_storage();
        let row = FriendRequestRow {
            id: 0,
            from_id: "a".to_string(),
            to_id: "b".to_string(),
            from_name: "ann".to_string(),
            from_image: String::new(),
            status: "pending".to_string(),
            created_at: 1,
        };
        storage.insert_friend_request(&row).unwrap();
        assert!(storage.accept_friend_request("a", "b", 2).unwrap());
        assert!(storage.find_friend_request("a", "b").unwrap().is_none());
        assert!(storage.has_friend_edge("a", "b").unwrap());
        assert!(storage.has_friend_edge("b", "a").unwrap());
        assert!(!storage.accept_friend_request("a", "b", 3).unwrap());
    }

    #[test]
    fn test_unlike_floors_at_zero_and_requires_edge() {
        let storage = test_storage();
        storage.upsert_user(&user("u1", "ann")).unwrap();
        assert!(matches!(
            storage.delete_like("u2", "u1"),
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(storage.get_user("u1").unwrap().unwrap().like_count, 0);
    }

    #[test]
    fn test_message_restores_deleted_chat_and_publishes() {
        let storage = test_storage();
        let mut rx = storage.subscribe();
        storage.insert_chat("c1", &["a", "b"], 0).unwrap();
        storage.insert_message(&message("m1", "c1", "b", 10)).unwrap();
        storage
            .soft_delete_chats("a", &["c1".to_string()], 20)
            .unwrap();
        assert_eq!(storage.get_chat_deletion("c1", "a").unwrap(), Some(20));
        assert!(storage.last_message("c1", "a").unwrap().is_none());
        assert_eq!(storage.last_message("c1", "b").unwrap().unwrap().id, "m1");

        let restored = storage.insert_message(&message("m2", "c1", "b", 30)).unwrap();
        assert_eq!(restored, vec!["a".to_string()]);
        assert!(storage.get_chat_deletion("c1", "a").unwrap().is_none());
        assert_eq!(storage.list_messages("c1", "a").unwrap().len(), 1);
        assert_eq!(storage.get_chat("c1").unwrap().unwrap().last_message_at, Some(30));

        let mut seen = 0;
        while let Ok(change) = rx.try_recv() {
            assert_eq!(
                change,
                StoreChange::Chat {
                    chat_id: "c1".to_string()
                }
            );
            seen += 1;
        }
        assert_eq!(seen, 4);
    }

    #[test]
    fn test_insert_chat_never_adds_a_third_participant() {
        let storage = test_storage();
        assert!(storage.insert_chat("c1", &["a", "b"], 0).unwrap());
        assert!(!storage.insert_chat("c1", &["b", "a"], 1).unwrap());
        assert!(matches!(
            storage.insert_chat("c1", &["a", "c"], 2),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(
            storage.list_participants("c1").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_unread_and_mark_seen() {
        let storage = test_storage();
        storage.insert_chat("c1", &["a", "b"], 0).unwrap();
        storage.insert_message(&message("m1", "c1", "b", 1)).unwrap();
        storage.insert_message(&message("m2", "c1", "b", 2)).unwrap();
        storage.insert_message(&message("m3", "c1", "a", 3)).unwrap();
        assert_eq!(storage.count_unread("c1", "a").unwrap(), 2);
        assert_eq!(storage.count_unread("c1", "b").unwrap(), 1);
        assert_eq!(storage.mark_seen("c1", "a").unwrap(), 2);
        assert_eq!(storage.count_unread("c1", "a").unwrap(), 0);
        assert_eq!(storage.mark_seen("c1", "a").unwrap(), 0);
        assert_eq!(storage.seen_by("m1").unwrap(), vec!["a".to_string()]);
        assert!(storage.seen_by("m3").unwrap().is_empty());
    }

    #[test]
    fn test_settings_and_reset_outbox() {
        let storage = test_storage();
        assert!(storage.get_setting("app_language").unwrap().is_none());
        storage.set_setting("app_language", "pt").unwrap();
        assert_eq!(storage.get_setting("app_language").unwrap().as_deref(), Some("pt"));

        let id = storage.insert_password_reset("ann@example.com", 7).unwrap();
        assert_eq!(storage.list_pending_password_resets().unwrap().len(), 1);
        assert!(storage.mark_password_reset_delivered(id).unwrap());
        assert!(storage.list_pending_password_resets().unwrap().is_empty());
    }
}
