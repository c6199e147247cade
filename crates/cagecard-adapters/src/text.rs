//! Free-text parsing shared by the adapters: dates, bout lines and fighter name markers.

use cagecard_core::TitleFight;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})\b").expect("valid date regex")
});
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s+([A-Za-z]{3,9})\.?\s+(\d{4})\b").expect("valid date regex")
});
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid date regex"));

static DEFEATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\s+def\.\s+(.+?)\s+(?:via|by)\s+(.+)$").expect("valid bout regex")
});
static VERSUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+vs\.?\s+(.+)$").expect("valid bout regex"));

static INTERIM_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*ic\s*\)").expect("valid marker regex"));
static CHAMPION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*c\s*\)").expect("valid marker regex"));
static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]").expect("valid cleanup regex"));

fn from_parts(month: &str, day: &str, year: &str) -> Option<NaiveDate> {
    // %B accepts both full and abbreviated month names when parsing
    NaiveDate::parse_from_str(&format!("{month} {day} {year}"), "%B %d %Y").ok()
}

/// First date found in `text`, trying "June 28, 2025", "28 June 2025" and "2025-06-28" shapes.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    for caps in MONTH_DAY_YEAR.captures_iter(text) {
        if let Some(date) = from_parts(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    for caps in DAY_MONTH_YEAR.captures_iter(text) {
        if let Some(date) = from_parts(&caps[2], &caps[1], &caps[3]) {
            return Some(date);
        }
    }
    for caps in ISO_DATE.captures_iter(text) {
        let parsed = (caps[1].parse(), caps[2].parse(), caps[3].parse());
        if let (Ok(year), Ok(month), Ok(day)) = parsed {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }
    None
}

/// Source timestamps are read on US Eastern standard time so evening cards keep their local date.
pub const EVENT_UTC_OFFSET_HOURS: i32 = -5;

pub fn local_event_date(instant: DateTime<Utc>) -> Option<NaiveDate> {
    let offset = FixedOffset::east_opt(EVENT_UTC_OFFSET_HOURS * 3600)?;
    Some(instant.with_timezone(&offset).date_naive())
}

pub fn date_from_unix_seconds(value: &str) -> Option<NaiveDate> {
    let seconds: i64 = value.trim().parse().ok()?;
    DateTime::from_timestamp(seconds, 0).and_then(local_event_date)
}

/// Event date of an ISO timestamp such as "2024-04-14T02:00Z". Bare dates are taken as-is.
pub fn date_from_iso_timestamp(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let instant = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%MZ")
                .ok()
                .map(|naive| naive.and_utc())
        });
    match instant {
        Some(instant) => local_event_date(instant),
        None => NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok(),
    }
}

/// Round number in 1..=5; anything else is treated as unknown.
pub fn parse_round(text: &str) -> Option<u8> {
    let digits: String = text.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().filter(|round| (1..=5).contains(round))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoutText {
    pub fighter1: String,
    pub fighter2: String,
    pub fighter1_won: bool,
    pub method: Option<String>,
}

/// Parses "<A> def. <B> via <method>" and "<A> vs. <B>" lines.
pub fn parse_bout_text(text: &str) -> Option<BoutText> {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(caps) = DEFEATED.captures(&line) {
        return Some(BoutText {
            fighter1: caps[1].trim().to_string(),
            fighter2: caps[2].trim().to_string(),
            fighter1_won: true,
            method: Some(caps[3].trim().to_string()).filter(|m| !m.is_empty()),
        });
    }

    let caps = VERSUS.captures(&line)?;
    Some(BoutText {
        fighter1: caps[1].trim().to_string(),
        fighter2: caps[2].trim().to_string(),
        fighter1_won: false,
        method: None,
    })
}

/// Champion marker on a raw fighter cell, read before any cleanup.
pub fn champion_marker(raw: &str) -> Option<TitleFight> {
    if INTERIM_MARKER.is_match(raw) {
        Some(TitleFight::Interim)
    } else if CHAMPION_MARKER.is_match(raw) {
        Some(TitleFight::Undisputed)
    } else {
        None
    }
}

/// Strips parentheticals, footnote brackets and trailing asterisks, then collapses whitespace.
pub fn clean_fighter_name(raw: &str) -> String {
    let stripped = PARENTHETICAL.replace_all(raw, "");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('*')
        .trim()
        .to_string()
}

/// Title type implied by a weight-class label such as "Interim Featherweight Championship".
pub fn title_from_weight_class(weight_class: &str) -> TitleFight {
    let lower = weight_class.to_lowercase();
    let titled = lower.contains("championship") || lower.contains("title");
    if titled && lower.contains("interim") {
        TitleFight::Interim
    } else if titled {
        TitleFight::Undisputed
    } else {
        TitleFight::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_date_shapes() {
        assert_eq!(parse_date("June 28, 2025"), Some(day(2025, 6, 28)));
        assert_eq!(parse_date("Date: Jun 28, 2025"), Some(day(2025, 6, 28)));
        assert_eq!(parse_date("28 June 2025"), Some(day(2025, 6, 28)));
        assert_eq!(parse_date("Sat, 2025-6-28"), Some(day(2025, 6, 28)));
        assert_eq!(parse_date("April 13, 2024 (2024-04-13)"), Some(day(2024, 4, 13)));
    }

    #[test]
    fn unparseable_dates_are_none() {
        assert_eq!(parse_date("TBD"), None);
        assert_eq!(parse_date("Sat, Apr 13"), None);
        assert_eq!(parse_date("Smarch 40, 2025"), None);
    }

    #[test]
    fn defeated_line_sets_winner_and_method() {
        let bout = parse_bout_text("Jon Jones def. Ciryl Gane via submission").unwrap();
        assert_eq!(bout.fighter1, "Jon Jones");
        assert_eq!(bout.fighter2, "Ciryl Gane");
        assert!(bout.fighter1_won);
        assert_eq!(bout.method.as_deref(), Some("submission"));
    }

    #[test]
    fn versus_line_has_no_result() {
        let bout = parse_bout_text("Alex Pereira vs. Jamahal Hill").unwrap();
        assert_eq!(bout.fighter2, "Jamahal Hill");
        assert!(!bout.fighter1_won);
        assert_eq!(bout.method, None);
        assert!(parse_bout_text("Tickets on sale now").is_none());
    }

    #[test]
    fn markers_are_detected_before_cleanup() {
        assert_eq!(champion_marker("Alex Pereira (c)"), Some(TitleFight::Undisputed));
        assert_eq!(champion_marker("Max Holloway (ic)"), Some(TitleFight::Interim));
        assert_eq!(champion_marker("Justin Gaethje"), None);
        assert_eq!(clean_fighter_name("  Alex  Pereira (c)[a] "), "Alex Pereira");
        assert_eq!(clean_fighter_name("Bo Nickal*"), "Bo Nickal");
    }

    #[test]
    fn weight_class_labels_imply_titles() {
        assert_eq!(
            title_from_weight_class("Light Heavyweight Championship"),
            TitleFight::Undisputed
        );
        assert_eq!(
            title_from_weight_class("Interim Featherweight title"),
            TitleFight::Interim
        );
        assert_eq!(title_from_weight_class("Bantamweight"), TitleFight::None);
    }

    #[test]
    fn rounds_outside_range_are_dropped() {
        assert_eq!(parse_round("3"), Some(3));
        assert_eq!(parse_round("0"), None);
        assert_eq!(parse_round("7"), None);
        assert_eq!(parse_round("--"), None);
    }

    #[test]
    fn late_utc_timestamps_keep_the_local_event_date() {
        assert_eq!(date_from_iso_timestamp("2024-04-14T02:00Z"), Some(day(2024, 4, 13)));
        assert_eq!(date_from_iso_timestamp("2024-04-13T22:00Z"), Some(day(2024, 4, 13)));
        assert_eq!(
            date_from_iso_timestamp("2024-04-14T03:30:00+00:00"),
            Some(day(2024, 4, 13))
        );
        assert_eq!(date_from_iso_timestamp("2024-04-13"), Some(day(2024, 4, 13)));
        assert_eq!(date_from_iso_timestamp("TBD"), None);
        assert_eq!(date_from_unix_seconds("1713052800"), Some(day(2024, 4, 13)));
        assert_eq!(date_from_unix_seconds("soon"), None);
    }
}
