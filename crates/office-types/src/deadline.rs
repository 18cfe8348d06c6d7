//! Deadline parsing and remaining-time / urgency computation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Naive layouts accepted after RFC 3339; interpreted as UTC.
const NAIVE_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a deadline in any accepted layout. Returns `None` when nothing matches.
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

string_enum! {
    /// Deadline urgency bucket.
    pub enum Urgency ("urgency") {
        Normal => "normal",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
        Critical => "critical",
    }
}

/// Human-readable time left until a deadline. Components are negative when overdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingTime {
    pub text: String,
    pub is_overdue: bool,
    pub urgency: Urgency,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

/// Compute remaining time for `deadline` as seen at `now`.
pub fn remaining_time(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> RemainingTime {
    let Some(deadline) = deadline else {
        return RemainingTime {
            text: "no deadline".to_string(),
            is_overdue: false,
            urgency: Urgency::Normal,
            days: 0,
            hours: 0,
            minutes: 0,
        };
    };

    let diff = deadline - now;
    if diff < chrono::Duration::zero() {
        let overdue = -diff;
        let days = overdue.num_days();
        let hours = overdue.num_hours() % 24;
        let minutes = overdue.num_minutes() % 60;
        let text = if days > 0 {
            format!("Overdue by {}", plural(days, "day"))
        } else if hours > 0 {
            format!("Overdue by {}", plural(hours, "hour"))
        } else {
            "Overdue".to_string()
        };
        return RemainingTime {
            text,
            is_overdue: true,
            urgency: Urgency::Critical,
            days: -days,
            hours: -hours,
            minutes: -minutes,
        };
    }

    let days = diff.num_days();
    let hours = diff.num_hours() % 24;
    let minutes = diff.num_minutes() % 60;
    let (text, urgency) = if days >= 7 {
        (format!("{} left", plural(days, "day")), Urgency::Normal)
    } else if days > 3 {
        (format!("{} left", plural(days, "day")), Urgency::Medium)
    } else if days >= 1 {
        let urgency = if days == 1 { Urgency::Urgent } else { Urgency::High };
        (
            format!("{} {} left", plural(days, "day"), plural(hours, "hour")),
            urgency,
        )
    } else if hours > 0 {
        (
            format!("{} {} left", plural(hours, "hour"), plural(minutes, "minute")),
            Urgency::Urgent,
        )
    } else {
        (format!("{} left", plural(minutes, "minute")), Urgency::Critical)
    };
    RemainingTime {
        text,
        is_overdue: false,
        urgency,
        days,
        hours,
        minutes,
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn parses_every_accepted_layout() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 1, 17, 30, 0).unwrap();
        assert_eq!(parse_deadline("2025-04-01T17:30:00Z"), Some(expected));
        assert_eq!(parse_deadline("2025-04-01T19:30:00+02:00"), Some(expected));
        assert_eq!(parse_deadline("2025-04-01T17:30:00"), Some(expected));
        assert_eq!(parse_deadline("2025-04-01 17:30:00"), Some(expected));
        assert_eq!(
            parse_deadline("2025-04-01"),
            Some(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_deadline("01/04/2025"), None);
        assert_eq!(parse_deadline(""), None);
    }

    #[test]
    fn no_deadline() {
        let r = remaining_time(None, now());
        assert_eq!(r.text, "no deadline");
        assert!(!r.is_overdue);
        assert_eq!(r.urgency, Urgency::Normal);
    }

    #[test]
    fn exactly_seven_days_is_normal() {
        let r = remaining_time(Some(now() + Duration::days(7)), now());
        assert_eq!(r.urgency, Urgency::Normal);
        assert_eq!(r.days, 7);
        assert_eq!(r.text, "7 days left");
    }

    #[test]
    fn buckets_by_remaining_days() {
        let at = |d: Duration| remaining_time(Some(now() + d), now());
        assert_eq!(at(Duration::days(5)).urgency, Urgency::Medium);
        assert_eq!(at(Duration::days(3)).urgency, Urgency::High);
        let r = at(Duration::days(2) + Duration::hours(5));
        assert_eq!(r.urgency, Urgency::High);
        assert_eq!(r.text, "2 days 5 hours left");
        let r = at(Duration::days(1) + Duration::hours(1));
        assert_eq!(r.urgency, Urgency::Urgent);
        assert_eq!(r.text, "1 day 1 hour left");
        let r = at(Duration::hours(4) + Duration::minutes(12));
        assert_eq!(r.urgency, Urgency::Urgent);
        assert_eq!(r.text, "4 hours 12 minutes left");
        let r = at(Duration::minutes(30));
        assert_eq!(r.urgency, Urgency::Critical);
        assert_eq!(r.minutes, 30);
    }

    #[test]
    fn deadline_exactly_now_is_critical_not_overdue() {
        let r = remaining_time(Some(now()), now());
        assert!(!r.is_overdue);
        assert_eq!(r.urgency, Urgency::Critical);
        assert_eq!(r.text, "0 minutes left");
    }

    #[test]
    fn overdue_components_are_negative() {
        let r = remaining_time(Some(now() - Duration::days(2) - Duration::hours(3)), now());
        assert!(r.is_overdue);
        assert_eq!(r.urgency, Urgency::Critical);
        assert_eq!(r.text, "Overdue by 2 days");
        assert_eq!((r.days, r.hours), (-2, -3));

        let r = remaining_time(Some(now() - Duration::hours(5)), now());
        assert_eq!(r.text, "Overdue by 5 hours");

        let r = remaining_time(Some(now() - Duration::minutes(10)), now());
        assert_eq!(r.text, "Overdue");
        assert_eq!(r.minutes, -10);
    }

    #[test]
    fn same_inputs_same_output() {
        let d = Some(now() + Duration::hours(50));
        assert_eq!(remaining_time(d, now()), remaining_time(d, now()));
    }
}
