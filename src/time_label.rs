//! Relative time labels for the chat list.

use std::fmt;

use chrono::{DateTime, TimeZone, Timelike};
use serde::Serialize;

use crate::account::Language;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// How long ago a message was sent, bucketed the way the chat list shows it.
///
/// Buckets use whole elapsed days, not calendar days: anything under 24 hours
/// shows the clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeLabel {
    Clock { hour: u32, minute: u32 },
    Yesterday,
    Days { days: i64 },
    Weeks { weeks: i64 },
}

impl TimeLabel {
    /// Label for `created` as seen at `now`. Clock times are taken in
    /// `created`'s timezone. Timestamps in the future count as now.
    pub fn between<Tz: TimeZone>(created: &DateTime<Tz>, now: &DateTime<Tz>) -> Self {
        let elapsed = (now.timestamp_millis() - created.timestamp_millis()).max(0);
        let days = elapsed / DAY_MS;
        match days {
            0 => TimeLabel::Clock {
                hour: created.hour(),
                minute: created.minute(),
            },
            1 => TimeLabel::Yesterday,
            2..=6 => TimeLabel::Days { days },
            _ => TimeLabel::Weeks { weeks: days / 7 },
        }
    }

    /// Same as [`TimeLabel::between`] for UNIX-millisecond timestamps shown in
    /// `tz`. `None` when a timestamp is out of chrono's range.
    pub fn from_millis<Tz: TimeZone>(created_ms: i64, now_ms: i64, tz: &Tz) -> Option<Self> {
        let created = tz.timestamp_millis_opt(created_ms).single()?;
        let now = tz.timestamp_millis_opt(now_ms).single()?;
        Some(Self::between(&created, &now))
    }

    pub fn localized(&self, language: Language) -> String {
        match (self, language) {
            (TimeLabel::Clock { hour, minute }, _) => format!("{hour:02}:{minute:02}"),
            (TimeLabel::Yesterday, Language::En) => "yesterday".to_string(),
            (TimeLabel::Yesterday, Language::Es) => "Ayer".to_string(),
            (TimeLabel::Yesterday, Language::Pt) => "Ontem".to_string(),
            (TimeLabel::Days { days }, Language::En) => format!("{days} days"),
            (TimeLabel::Days { days }, Language::Es) => format!("{days} días"),
            (TimeLabel::Days { days }, Language::Pt) => format!("{days} dias"),
            (TimeLabel::Weeks { weeks: 1 }, Language::En) => "1 week".to_string(),
            (TimeLabel::Weeks { weeks }, Language::En) => format!("{weeks} weeks"),
            (TimeLabel::Weeks { weeks }, Language::Es | Language::Pt) => format!("{weeks} sem"),
        }
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.localized(Language::En))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(offset_hours: i32, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn same_day_shows_clock_in_local_time() {
        let created = at(-3, 2026, 10, 19, 14, 5);
        let now = at(-3, 2026, 10, 19, 18, 30);
        assert_eq!(TimeLabel::between(&created, &now).to_string(), "14:05");
    }

    #[test]
    fn early_morning_is_zero_padded() {
        let created = at(2, 2026, 10, 19, 7, 3);
        let now = at(2, 2026, 10, 19, 9, 0);
        assert_eq!(TimeLabel::between(&created, &now).to_string(), "07:03");
    }

    #[test]
    fn day_and_week_buckets() {
        let now = at(0, 2026, 10, 19, 12, 0);
        let cases = [
            (1, "yesterday"),
            (2, "2 days"),
            (6, "6 days"),
            (7, "1 week"),
            (8, "1 week"),
            (13, "1 week"),
            (14, "2 weeks"),
            (15, "2 weeks"),
            (60, "8 weeks"),
        ];
        for (days, expected) in cases {
            let created = now - Duration::days(days);
            assert_eq!(
                TimeLabel::between(&created, &now).to_string(),
                expected,
                "{days} days ago"
            );
        }
    }

    #[test]
    fn future_timestamp_counts_as_now() {
        let now = at(0, 2026, 10, 19, 12, 0);
        let created = now + Duration::minutes(5);
        assert_eq!(
            TimeLabel::between(&created, &now),
            TimeLabel::Clock { hour: 12, minute: 5 }
        );
    }

    #[test]
    fn localized_labels() {
        assert_eq!(TimeLabel::Yesterday.localized(Language::Es), "Ayer");
        assert_eq!(TimeLabel::Days { days: 3 }.localized(Language::Es), "3 días");
        assert_eq!(TimeLabel::Weeks { weeks: 1 }.localized(Language::Es), "1 sem");
        assert_eq!(TimeLabel::Weeks { weeks: 4 }.localized(Language::Pt), "4 sem");
    }

    #[test]
    fn from_millis_uses_zone() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        // 2026-10-19T13:05:00Z is 14:05 at +01:00.
        let created = 1_792_415_100_000;
        let label = TimeLabel::from_millis(created, created + 60_000, &tz).unwrap();
        assert_eq!(label.to_string(), "14:05");
    }
}
