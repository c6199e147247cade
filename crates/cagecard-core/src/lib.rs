//! Core domain model for cagecard: discovery candidates, canonical events and fight cards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod record;

pub use record::{FighterRecord, RecordParseError};

pub const CRATE_NAME: &str = "cagecard-core";

/// Closed set of external sources. Declaration order is the default fallback priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    #[serde(rename = "wikipedia")]
    Wikipedia,
    #[serde(rename = "ufcstats")]
    UfcStats,
    #[serde(rename = "ufc_official")]
    UfcOfficial,
    #[serde(rename = "espn_mma")]
    EspnMma,
}

impl SourceTag {
    pub const ALL: [SourceTag; 4] = [
        SourceTag::Wikipedia,
        SourceTag::UfcStats,
        SourceTag::UfcOfficial,
        SourceTag::EspnMma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Wikipedia => "wikipedia",
            SourceTag::UfcStats => "ufcstats",
            SourceTag::UfcOfficial => "ufc_official",
            SourceTag::EspnMma => "espn_mma",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value {value:?} for {kind}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for SourceTag {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "source",
                value: s.to_string(),
            })
    }
}

/// Which part of the calendar a discovery run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    #[default]
    Full,
    Future,
    Historical,
}

impl DiscoveryMode {
    /// Events on `today` count as historical. Undated candidates are always admitted.
    pub fn admits(&self, date: Option<NaiveDate>, today: NaiveDate, since: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return true;
        };
        let in_mode = match self {
            DiscoveryMode::Full => true,
            DiscoveryMode::Future => date > today,
            DiscoveryMode::Historical => date <= today,
        };
        in_mode && since.map_or(true, |since| date >= since)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Full => "full",
            DiscoveryMode::Future => "future",
            DiscoveryMode::Historical => "historical",
        }
    }
}

impl FromStr for DiscoveryMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(DiscoveryMode::Full),
            "future" => Ok(DiscoveryMode::Future),
            "historical" => Ok(DiscoveryMode::Historical),
            _ => Err(UnknownVariant {
                kind: "mode",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Postponed,
}

impl EventStatus {
    pub fn from_date(date: NaiveDate, today: NaiveDate) -> Self {
        if date < today {
            EventStatus::Completed
        } else {
            EventStatus::Scheduled
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleFight {
    Undisputed,
    Interim,
    #[default]
    None,
}

impl TitleFight {
    pub fn is_title(&self) -> bool {
        !matches!(self, TitleFight::None)
    }
}

/// Broadcast tier of a bout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    #[default]
    MainCard,
    Prelims,
    EarlyPrelims,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::MainCard => "main-card",
            Segment::Prelims => "prelims",
            Segment::EarlyPrelims => "early-prelims",
        }
    }
}

/// Where a source places its main event in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardOrder {
    #[default]
    MainEventLast,
    MainEventFirst,
}

/// Unreconciled discovery record from a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub id: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub source: SourceTag,
    pub url: String,
}

pub type IdentityKey = (Option<NaiveDate>, String);

pub fn normalize_event_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl CandidateEvent {
    pub fn identity_key(&self) -> IdentityKey {
        (self.date, normalize_event_name(&self.name))
    }
}

/// Surviving candidate for one identity key plus every source URL that described it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub candidate: CandidateEvent,
    pub source_urls: BTreeMap<SourceTag, String>,
}

impl CanonicalEvent {
    pub fn from_candidate(candidate: CandidateEvent) -> Self {
        let mut source_urls = BTreeMap::new();
        source_urls.insert(candidate.source, candidate.url.clone());
        Self {
            candidate,
            source_urls,
        }
    }

    /// Records provenance of a dropped duplicate without touching the surviving metadata.
    pub fn absorb(&mut self, duplicate: &CandidateEvent) {
        self.source_urls
            .entry(duplicate.source)
            .or_insert_with(|| duplicate.url.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fighter {
    pub name: String,
    pub record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_breakdown: Option<FighterRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub is_champion: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<String>,
}

impl Fighter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn set_record(&mut self, record: FighterRecord) {
        self.record = Some(record.to_string());
        self.record_breakdown = Some(record);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fight {
    pub bout_order: u32,
    pub fighter1: Fighter,
    pub fighter2: Fighter,
    pub weight_class: String,
    pub title_fight: TitleFight,
    pub segment: Segment,
    pub method: Option<String>,
    pub round: Option<u8>,
    pub time: Option<String>,
    pub winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonuses: Option<Vec<String>>,
}

impl Fight {
    pub fn new(fighter1: Fighter, fighter2: Fighter, weight_class: impl Into<String>) -> Self {
        Self {
            bout_order: 0,
            fighter1,
            fighter2,
            weight_class: weight_class.into(),
            title_fight: TitleFight::None,
            segment: Segment::MainCard,
            method: None,
            round: None,
            time: None,
            winner: None,
            bonuses: None,
        }
    }

    /// Enforces the result invariants: no winner without a method, and a winner
    /// must name one of the two fighters.
    pub fn settle_result(&mut self) {
        if self.method.as_deref().is_some_and(|m| m.trim().is_empty()) {
            self.method = None;
        }
        if self.method.is_none() {
            self.winner = None;
        }
        if let Some(winner) = &self.winner {
            if winner != &self.fighter1.name && winner != &self.fighter2.name {
                self.winner = None;
            }
        }
        if self.round.is_some_and(|r| !(1..=5).contains(&r)) {
            self.round = None;
        }
    }

    pub fn involves(&self, name: &str) -> bool {
        self.fighter1.name == name || self.fighter2.name == name
    }
}

/// Final per-event record handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UfcEvent {
    pub event_id: String,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<u32>,
    pub fights: Vec<Fight>,
    pub scraped_at: DateTime<Utc>,
    #[serde(default)]
    pub source_urls: BTreeMap<SourceTag, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventValidationError {
    #[error("bout orders are not contiguous from 1: {0:?}")]
    BoutOrder(Vec<u32>),
    #[error("bout {bout_order} names winner {winner:?} who is not on the bout")]
    ForeignWinner { bout_order: u32, winner: String },
    #[error("bout {bout_order} has a winner but no method")]
    WinnerWithoutMethod { bout_order: u32 },
    #[error("bout {bout_order} has round {round} outside 1-5")]
    RoundOutOfRange { bout_order: u32, round: u8 },
}

impl UfcEvent {
    pub fn validate(&self) -> Result<(), EventValidationError> {
        let orders: BTreeSet<u32> = self.fights.iter().map(|f| f.bout_order).collect();
        let expected: BTreeSet<u32> = (1..=self.fights.len() as u32).collect();
        if orders != expected {
            return Err(EventValidationError::BoutOrder(
                self.fights.iter().map(|f| f.bout_order).collect(),
            ));
        }

        for fight in &self.fights {
            if let Some(winner) = &fight.winner {
                if fight.method.is_none() {
                    return Err(EventValidationError::WinnerWithoutMethod {
                        bout_order: fight.bout_order,
                    });
                }
                if !fight.involves(winner) {
                    return Err(EventValidationError::ForeignWinner {
                        bout_order: fight.bout_order,
                        winner: winner.clone(),
                    });
                }
            }
            if let Some(round) = fight.round {
                if !(1..=5).contains(&round) {
                    return Err(EventValidationError::RoundOutOfRange {
                        bout_order: fight.bout_order,
                        round,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn main_event(&self) -> Option<&Fight> {
        self.fights.iter().find(|f| f.bout_order == 1)
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            event_id: self.event_id.clone(),
            event_name: self.event_name.clone(),
            event_date: self.event_date,
            venue: self.venue.clone(),
            location: self.location.clone(),
            status: self.status,
            fight_count: self.fights.len(),
        }
    }
}

/// Listing row returned by the persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: String,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub status: EventStatus,
    pub fight_count: usize,
}
