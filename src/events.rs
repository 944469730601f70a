//! Short-lived profile events and their expiry.
//!
//! The picker shows a date as `"<day> <month>"` with no year. It only offers
//! today through [`EVENT_PICKER_HORIZON_DAYS`] ahead, so the year is recovered
//! once, when the event is added, and the resolved day is stored next to the
//! text. Expiry reads that stored day. Rows saved before it existed are
//! resolved against their own `created_at`, never against the viewing date.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::account::Language;
use crate::error::{SocialError, SocialResult};
use crate::storage::{EventRow, Storage};

/// An event disappears this long after the start of its day.
pub const EVENT_TTL_HOURS: i64 = 24;
/// Furthest day ahead the date picker offers.
pub const EVENT_PICKER_HORIZON_DAYS: i64 = 31;
/// How many years back a day/month is searched, enough to reach a 29 February.
const LEAP_CYCLE_YEARS: i32 = 4;

const ENGLISH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// 1-based month for a full or three-letter name in `language`, or an English
/// abbreviation.
fn month_number(name: &str, language: Language) -> Option<u32> {
    let name = name.trim_end_matches('.').to_lowercase();
    let months = language.months();
    if let Some(i) = months.iter().position(|m| *m == name) {
        return Some(i as u32 + 1);
    }
    if let Some(i) = months
        .iter()
        .position(|m| m.chars().take(3).collect::<String>() == name)
    {
        return Some(i as u32 + 1);
    }
    ENGLISH_ABBREVIATIONS
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u32 + 1)
}

fn day_and_month(text: &str, language: Language) -> Option<(u32, u32)> {
    let mut parts = text.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month = month_number(parts.next()?, language)?;
    if parts.next().is_some() {
        return None;
    }
    Some((day, month))
}

/// Parse `"<day> <month>"` as picked on `today`.
///
/// The occurrence inside the picker window wins. Otherwise the date is the
/// most recent past occurrence, which may be several years back for 29 Feb.
pub fn parse_event_date(text: &str, language: Language, today: NaiveDate) -> Option<NaiveDate> {
    let (day, month) = day_and_month(text, language)?;
    let (first, last) = event_date_window(today);
    let candidates: Vec<NaiveDate> = (today.year() - LEAP_CYCLE_YEARS..=today.year() + 1)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .collect();
    candidates
        .iter()
        .copied()
        .find(|date| *date >= first && *date <= last)
        .or_else(|| candidates.iter().copied().filter(|date| *date < first).max())
}

/// The day an event falls on: the stored resolution, or for older rows the
/// text read in any supported language as picked on the day it was created.
pub fn event_day(event: &EventRow, language: Language) -> Option<NaiveDate> {
    if let Some(date) = event.event_on {
        return Some(date);
    }
    let picked_on = DateTime::<Utc>::from_timestamp_millis(event.created_at)?.date_naive();
    std::iter::once(language)
        .chain(Language::ALL)
        .find_map(|lang| parse_event_date(&event.date, lang, picked_on))
}

/// Whether at least [`EVENT_TTL_HOURS`] have passed since the start of `date`.
pub fn is_expired(date: NaiveDate, now: NaiveDateTime) -> bool {
    let start = date.and_time(chrono::NaiveTime::MIN);
    now - start >= Duration::hours(EVENT_TTL_HOURS)
}

/// Picker format, e.g. `"5 Jan"`.
pub fn format_event_date(date: NaiveDate) -> String {
    date.format("%-d %b").to_string()
}

/// First and last selectable dates.
pub fn event_date_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(EVENT_PICKER_HORIZON_DAYS))
}

/// Add an event to `user_id`'s profile. The date must parse and lie inside
/// the picker window.
pub fn add_event(
    storage: &Storage,
    user_id: &str,
    title: &str,
    date_text: &str,
    language: Language,
    now: NaiveDateTime,
    now_ms: i64,
) -> SocialResult<EventRow> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SocialError::Validation("event title cannot be empty".to_string()));
    }
    let today = now.date();
    let date = parse_event_date(date_text, language, today)
        .ok_or_else(|| SocialError::Validation(format!("unrecognised date {date_text:?}")))?;
    let (first, last) = event_date_window(today);
    if date < first || date > last {
        return Err(SocialError::Validation(format!(
            "date {date_text:?} is outside the selectable window"
        )));
    }
    if !storage.user_exists(user_id)? {
        return Err(SocialError::NotFound(format!("user {user_id}")));
    }
    let mut row = EventRow {
        id: 0,
        user_id: user_id.to_string(),
        title: title.to_string(),
        date: date_text.trim().to_string(),
        event_on: Some(date),
        created_at: now_ms,
    };
    row.id = storage.insert_event(&row)?;
    Ok(row)
}

/// Delete `user_id`'s expired events and return the live ones. Events whose
/// day cannot be determined are kept.
pub fn prune_expired_events(
    storage: &Storage,
    user_id: &str,
    now: NaiveDateTime,
    language: Language,
) -> SocialResult<Vec<EventRow>> {
    let mut live = Vec::new();
    for event in storage.list_events(user_id)? {
        match event_day(&event, language) {
            Some(date) if is_expired(date, now) => match storage.delete_event(event.id) {
                Ok(_) => crate::slog!(
                    "events: removed expired event {} of {}",
                    event.id,
                    crate::logging::user_id(user_id)
                ),
                Err(e) => {
                    // Still hidden from the caller; the next read retries the delete.
                    crate::slog!("events: failed to remove event {}: {}", event.id, e);
                }
            },
            Some(_) => live.push(event),
            None => {
                crate::slog!("events: unparseable date {:?} on event {}", event.date, event.id);
                live.push(event);
            }
        }
    }
    Ok(live)
}
