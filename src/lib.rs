pub mod account;
pub mod chat_list;
pub mod complaint;
pub mod error;
pub mod events;
pub mod logging;
pub mod relationship;
pub mod storage;
pub mod time_label;
pub mod watch;
pub mod web;

/// Current wall-clock time as UNIX milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
