//! Line-oriented logging with timestamps, source locations and optional colour.
//!
//! The [`slog!`] macro writes lines of the form:
//!
//! ```text
//! 20261019T14:05:12.000 - src/chat_list.rs:88 - chat: deleted c-alice_b for u-3f9a1c2
//! ```
//!
//! Output goes to stderr unless [`set_writer`] installs another destination.
//! User and chat identifiers are truncated and, on a terminal, coloured by a
//! hash of their content so the same id always reads the same way.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};

use chrono::Utc;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_WRITER: LazyLock<Mutex<Box<dyn Write + Send>>> =
    LazyLock::new(|| Mutex::new(Box::new(io::stderr())));

/// Detect whether stderr is a terminal. Call once at startup.
pub fn init() {
    COLOUR_ENABLED.store(io::stderr().is_terminal(), Ordering::Relaxed);
}

/// Send all subsequent log lines to `w`. Disables colour.
pub fn set_writer(w: Box<dyn Write + Send>) {
    COLOUR_ENABLED.store(false, Ordering::Relaxed);
    if let Ok(mut writer) = LOG_WRITER.lock() {
        *writer = w;
    }
}

pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

const ID_COLOURS: &[&str] = &[
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m", "\x1b[31m",
    "\x1b[32m", "\x1b[33m", "\x1b[34m", "\x1b[35m", "\x1b[36m",
];

fn hash_colour(id: &str) -> &'static str {
    let hash: u32 = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    ID_COLOURS[(hash as usize) % ID_COLOURS.len()]
}

const LOG_ID_TRUNCATE_LEN: usize = 7;

fn truncate_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(LOG_ID_TRUNCATE_LEN)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

fn tagged(prefix: &str, id: &str) -> String {
    let short = truncate_id(id);
    if colour_enabled() {
        format!("{}{prefix}-{short}{RESET}", hash_colour(id))
    } else {
        format!("{prefix}-{short}")
    }
}

/// Format a user id, e.g. `u-3f9a1c2`.
pub fn user_id(id: &str) -> String {
    tagged("u", id)
}

/// Format a chat id, e.g. `c-zoe_ann`.
pub fn chat_id(id: &str) -> String {
    tagged("c", id)
}

/// Current UTC time as `YYYYMMDDTHH:MM:SS.mmm`.
pub fn format_timestamp() -> String {
    Utc::now().format("%Y%m%dT%H:%M:%S%.3f").to_string()
}

/// Write one line. Called by [`slog!`].
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    let formatted = if colour_enabled() {
        format!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}")
    } else {
        format!("{ts} - {file}:{line} - {msg}")
    };
    if let Ok(mut writer) = LOG_WRITER.lock() {
        let _ = writeln!(*writer, "{formatted}");
    }
}

/// Emit a log line with timestamp and source location.
///
/// ```ignore
/// slog!("like: {} liked {}", logging::user_id(&viewer), logging::user_id(&target));
/// ```
#[macro_export]
macro_rules! slog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
