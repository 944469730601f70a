//! The viewer's chat list: visibility, previews, unread counts, and the
//! bulk actions (delete, hide behind a password, mute).

use std::collections::BTreeSet;

use chrono::TimeZone;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{logged, SocialError, SocialResult};
use crate::logging;
use crate::relationship::{FriendCard, PLACEHOLDER_PHOTO};
use crate::storage::{ChatHideRow, MessageRow, Storage};
use crate::time_label::TimeLabel;

/// Longest message preview shown in the list before it is cut.
pub const PREVIEW_MAX_CHARS: usize = 20;
const SALT_LEN: usize = 16;
const MESSAGE_ID_LEN: usize = 16;
const HOUR_MS: i64 = 60 * 60 * 1000;

/// Visibility of one chat for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Visible,
    DeletedForMe,
    HiddenBehindPassword,
}

impl ChatState {
    /// A hide always wins. A deleted chat comes back once a message newer
    /// than the deletion arrives.
    pub fn resolve(deleted_at: Option<i64>, last_message_at: Option<i64>, hidden: bool) -> Self {
        if hidden {
            return ChatState::HiddenBehindPassword;
        }
        match (deleted_at, last_message_at) {
            (Some(deleted), Some(last)) if last > deleted => ChatState::Visible,
            (Some(_), _) => ChatState::DeletedForMe,
            (None, _) => ChatState::Visible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastMessage {
    pub id: String,
    pub sender_id: String,
    pub preview: String,
    pub created_at: i64,
}

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatListEntry {
    pub chat_id: String,
    pub counterpart: FriendCard,
    pub last_message: Option<LastMessage>,
    pub unread: u32,
    pub muted: bool,
    /// End of the current mute, in ms. `None` when not muted.
    pub muted_until: Option<i64>,
}

impl ChatListEntry {
    /// Label for the last message as seen at `now_ms` in `tz`.
    pub fn time_label<Tz: TimeZone>(&self, now_ms: i64, tz: &Tz) -> Option<TimeLabel> {
        let last = self.last_message.as_ref()?;
        TimeLabel::from_millis(last.created_at, now_ms, tz)
    }

    fn sort_key(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(i64::MIN)
    }
}

/// Newest last message first, chats without messages last, ties by id.
pub fn sort_entries(entries: &mut [ChatListEntry]) {
    entries.sort_by(|a, b| {
        b.sort_key()
            .cmp(&a.sort_key())
            .then_with(|| a.chat_id.cmp(&b.chat_id))
    });
}

/// Cut `text` to [`PREVIEW_MAX_CHARS`] characters, marking the cut.
pub fn preview_text(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
    preview.push_str("...");
    preview
}

/// Chat id for a pair of user ids: hex SHA-256 over the sorted ids, each
/// prefixed with its byte length. The same pair always maps to the same id
/// and different pairs never share one.
pub fn chat_id_for(user_a: &str, user_b: &str) -> String {
    let (low, high) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    let mut hasher = Sha256::new();
    for id in [low, high] {
        hasher.update((id.len() as u64).to_be_bytes());
        hasher.update(id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn require_participant(storage: &Storage, chat_id: &str, user_id: &str) -> SocialResult<Vec<String>> {
    if storage.get_chat(chat_id)?.is_none() {
        return Err(SocialError::NotFound(format!("chat {chat_id}")));
    }
    let participants = storage.list_participants(chat_id)?;
    if !participants.iter().any(|p| p == user_id) {
        return Err(SocialError::Forbidden(format!(
            "not a participant of chat {chat_id}"
        )));
    }
    Ok(participants)
}

fn require_selection(chat_ids: &[String]) -> SocialResult<()> {
    if chat_ids.is_empty() {
        return Err(SocialError::Validation("no chats selected".to_string()));
    }
    Ok(())
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Open (or create) the conversation between `me` and `other`.
pub fn open_chat(storage: &Storage, me: &str, other: &str, now: i64) -> SocialResult<String> {
    if me == other {
        return Err(SocialError::Validation("cannot chat with yourself".to_string()));
    }
    if storage.is_blocked(me, other)? {
        return Err(SocialError::Blocked);
    }
    for id in [me, other] {
        if storage.get_user(id)?.is_none() {
            return Err(SocialError::NotFound(format!("user {id}")));
        }
    }
    let chat_id = chat_id_for(me, other);
    let created = logged("chat: create failed", storage.insert_chat(&chat_id, &[me, other], now))?;
    if created {
        crate::slog!(
            "chat: created {} for {} and {}",
            logging::chat_id(&chat_id),
            logging::user_id(me),
            logging::user_id(other)
        );
    }
    Ok(chat_id)
}

/// Append a message. A chat the other side deleted reappears for them.
pub fn send_message(
    storage: &Storage,
    chat_id: &str,
    sender_id: &str,
    text: &str,
    now: i64,
) -> SocialResult<MessageRow> {
    if text.trim().is_empty() {
        return Err(SocialError::Validation("message cannot be empty".to_string()));
    }
    let participants = require_participant(storage, chat_id, sender_id)?;
    for other in participants.iter().filter(|p| *p != sender_id) {
        if storage.is_blocked(sender_id, other)? {
            return Err(SocialError::Blocked);
        }
    }
    let row = MessageRow {
        id: random_hex(MESSAGE_ID_LEN),
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        text: text.to_string(),
        created_at: now,
    };
    let restored = logged("chat: send failed", storage.insert_message(&row))?;
    for user in restored {
        crate::slog!(
            "chat: {} visible again for {}",
            logging::chat_id(chat_id),
            logging::user_id(&user)
        );
    }
    Ok(row)
}

fn counterpart_card(storage: &Storage, me: &str, participants: &[String]) -> SocialResult<FriendCard> {
    let other = participants
        .iter()
        .find(|p| *p != me)
        .map(String::as_str)
        .unwrap_or(me);
    match storage.get_user(other)? {
        Some(user) => Ok(FriendCard::from_user(&user)),
        None => {
            crate::slog!("chat: counterpart {} has no profile", logging::user_id(other));
            Ok(FriendCard {
                id: other.to_string(),
                username: "unknown".to_string(),
                display_name: String::new(),
                photo: PLACEHOLDER_PHOTO.to_string(),
            })
        }
    }
}

fn build_entry(
    storage: &Storage,
    me: &str,
    chat_id: &str,
    participants: &[String],
    now: i64,
) -> SocialResult<ChatListEntry> {
    let last_message = storage.last_message(chat_id, me)?.map(|m| LastMessage {
        preview: preview_text(&m.text),
        id: m.id,
        sender_id: m.sender_id,
        created_at: m.created_at,
    });
    let muted_until = storage
        .get_chat_mute(chat_id, me)?
        .filter(|until| *until > now);
    Ok(ChatListEntry {
        chat_id: chat_id.to_string(),
        counterpart: counterpart_card(storage, me, participants)?,
        last_message,
        unread: storage.count_unread(chat_id, me)?,
        muted: muted_until.is_some(),
        muted_until,
    })
}

/// Visibility of `chat_id` for `me`, or `None` when `me` is not in it.
pub fn chat_state(storage: &Storage, me: &str, chat_id: &str) -> SocialResult<Option<ChatState>> {
    let Some(chat) = storage.get_chat(chat_id)? else {
        return Ok(None);
    };
    if !storage.list_participants(chat_id)?.iter().any(|p| p == me) {
        return Ok(None);
    }
    Ok(Some(ChatState::resolve(
        storage.get_chat_deletion(chat_id, me)?,
        chat.last_message_at,
        storage.get_chat_hide(chat_id, me)?.is_some(),
    )))
}

/// The list row for one chat if it is visible to `me`.
pub fn resolve_entry(
    storage: &Storage,
    me: &str,
    chat_id: &str,
    now: i64,
) -> SocialResult<Option<ChatListEntry>> {
    match chat_state(storage, me, chat_id)? {
        Some(ChatState::Visible) => {
            let participants = storage.list_participants(chat_id)?;
            build_entry(storage, me, chat_id, &participants, now).map(Some)
        }
        _ => Ok(None),
    }
}

fn entries_in_state(
    storage: &Storage,
    me: &str,
    wanted: ChatState,
    now: i64,
) -> SocialResult<Vec<ChatListEntry>> {
    let mut entries = Vec::new();
    for chat_id in storage.list_chat_ids_for(me)? {
        if chat_state(storage, me, &chat_id)? == Some(wanted) {
            let participants = storage.list_participants(&chat_id)?;
            entries.push(build_entry(storage, me, &chat_id, &participants, now)?);
        }
    }
    sort_entries(&mut entries);
    Ok(entries)
}

/// Every chat visible to `me`, newest first.
pub fn list_chats(storage: &Storage, me: &str, now: i64) -> SocialResult<Vec<ChatListEntry>> {
    entries_in_state(storage, me, ChatState::Visible, now)
}

/// Chats `me` hid behind a password.
pub fn list_hidden_chats(storage: &Storage, me: &str, now: i64) -> SocialResult<Vec<ChatListEntry>> {
    entries_in_state(storage, me, ChatState::HiddenBehindPassword, now)
}

/// Conversation as `me` sees it, oldest first.
pub fn list_messages(storage: &Storage, chat_id: &str, me: &str) -> SocialResult<Vec<MessageRow>> {
    require_participant(storage, chat_id, me)?;
    Ok(storage.list_messages(chat_id, me)?)
}

/// Mark every message from the other side as seen by `me`.
pub fn mark_seen(storage: &Storage, chat_id: &str, me: &str) -> SocialResult<usize> {
    require_participant(storage, chat_id, me)?;
    logged("chat: mark seen failed", storage.mark_seen(chat_id, me))
}

pub fn delete_chat(storage: &Storage, me: &str, chat_id: &str, now: i64) -> SocialResult<()> {
    delete_chats(storage, me, &[chat_id.to_string()], now)
}

/// Delete chats for `me` only. The other participants keep theirs.
pub fn delete_chats(storage: &Storage, me: &str, chat_ids: &[String], now: i64) -> SocialResult<()> {
    require_selection(chat_ids)?;
    for chat_id in chat_ids {
        require_participant(storage, chat_id, me)?;
    }
    logged("chat: delete failed", storage.soft_delete_chats(me, chat_ids, now))?;
    crate::slog!("chat: {} deleted {} chat(s)", logging::user_id(me), chat_ids.len());
    Ok(())
}

/// Hide a chat behind `password`. Only a salted digest is stored.
pub fn hide_chat(
    storage: &Storage,
    me: &str,
    chat_id: &str,
    password: &str,
    now: i64,
) -> SocialResult<()> {
    if password.is_empty() {
        return Err(SocialError::Validation("password cannot be empty".to_string()));
    }
    require_participant(storage, chat_id, me)?;
    let salt = random_hex(SALT_LEN);
    let row = ChatHideRow {
        chat_id: chat_id.to_string(),
        user_id: me.to_string(),
        password_hash: password_digest(&salt, password),
        salt,
        hidden_at: now,
    };
    logged("chat: hide failed", storage.insert_chat_hide(&row))?;
    crate::slog!("chat: {} hid {}", logging::user_id(me), logging::chat_id(chat_id));
    Ok(())
}

/// Reveal a hidden chat. A wrong password leaves it hidden.
pub fn unhide_chat(storage: &Storage, me: &str, chat_id: &str, password: &str) -> SocialResult<()> {
    let hide = storage
        .get_chat_hide(chat_id, me)?
        .ok_or_else(|| SocialError::NotFound(format!("hidden chat {chat_id}")))?;
    if password_digest(&hide.salt, password) != hide.password_hash {
        crate::slog!(
            "chat: wrong password for {} from {}",
            logging::chat_id(chat_id),
            logging::user_id(me)
        );
        return Err(SocialError::WrongPassword);
    }
    logged("chat: unhide failed", storage.delete_chat_hide(chat_id, me))?;
    Ok(())
}

/// Mute lengths offered by the bulk menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MuteDuration {
    OneHour,
    FourHours,
    EightHours,
    OneDay,
}

impl MuteDuration {
    pub fn from_hours(hours: u32) -> SocialResult<Self> {
        match hours {
            1 => Ok(MuteDuration::OneHour),
            4 => Ok(MuteDuration::FourHours),
            8 => Ok(MuteDuration::EightHours),
            24 => Ok(MuteDuration::OneDay),
            other => Err(SocialError::Validation(format!(
                "unsupported mute duration {other}h"
            ))),
        }
    }

    pub fn hours(self) -> i64 {
        match self {
            MuteDuration::OneHour => 1,
            MuteDuration::FourHours => 4,
            MuteDuration::EightHours => 8,
            MuteDuration::OneDay => 24,
        }
    }
}

/// Mute chats for `me`. Returns when the mute ends.
pub fn mute_chats(
    storage: &Storage,
    me: &str,
    chat_ids: &[String],
    duration: MuteDuration,
    now: i64,
) -> SocialResult<i64> {
    require_selection(chat_ids)?;
    for chat_id in chat_ids {
        require_participant(storage, chat_id, me)?;
    }
    let until = now + duration.hours() * HOUR_MS;
    logged("chat: mute failed", storage.set_chat_mutes(me, chat_ids, until))?;
    Ok(until)
}

/// Case-insensitive counterpart username search.
pub fn filter_by_username(entries: &[ChatListEntry], query: &str) -> Vec<ChatListEntry> {
    let query = query.trim().to_lowercase();
    entries
        .iter()
        .filter(|e| e.counterpart.username.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

/// Chats ticked in the list's selection mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSelection {
    selected: BTreeSet<String>,
}

impl ChatSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, chat_id: &str) {
        if !self.selected.remove(chat_id) {
            self.selected.insert(chat_id.to_string());
        }
    }

    /// Select all of `chat_ids`, or clear when they are all selected already.
    pub fn toggle_all(&mut self, chat_ids: &[String]) {
        if !chat_ids.is_empty() && chat_ids.iter().all(|id| self.selected.contains(id)) {
            self.selected.clear();
        } else {
            self.selected.extend(chat_ids.iter().cloned());
        }
    }

    pub fn is_selected(&self, chat_id: &str) -> bool {
        self.selected.contains(chat_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}
