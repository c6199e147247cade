//! ESPN's public MMA JSON API.

use async_trait::async_trait;
use cagecard_core::{
    CandidateEvent, CardOrder, DiscoveryMode, EventStatus, SourceTag, TitleFight, UfcEvent,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::fight_card::{assemble_card, classify_segment_header, BoutDraft, Corner, Outcome};
use crate::fighters::FighterRegistry;
use crate::text::date_from_iso_timestamp;
use crate::{
    filter_candidates, text_or_none, AdapterContext, AdapterError, SourceAdapter, SourceSettings,
};

pub const DEFAULT_BASE_URL: &str = "https://site.web.api.espn.com/apis/v2/sports/mma/ufc";
pub const EVENT_PAGE_URL: &str = "https://www.espn.com/mma/event/_/id";
pub const LIST_LIMIT: usize = 100;

/// Ids and labels arrive as strings or bare numbers depending on the endpoint.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => text_or_none(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// A field of the wrong shape reads as absent instead of failing its parent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value(value).ok()))
}

fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}

fn decode_item<T: DeserializeOwned>(value: Value, item: &'static str) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(source = %SourceTag::EspnMma, item, error = %err, "skipping malformed item");
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventList {
    #[serde(deserialize_with = "lenient_items")]
    pub events: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventEnvelope {
    pub event: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EspnEvent {
    #[serde(deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_items")]
    pub competitions: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Competition {
    #[serde(deserialize_with = "lenient_items")]
    pub competitors: Vec<Value>,
    #[serde(deserialize_with = "lenient")]
    pub weight_class: Option<Named>,
    #[serde(deserialize_with = "lenient")]
    pub title_bout: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub card_segment: Option<Named>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<CompetitionStatus>,
    #[serde(deserialize_with = "lenient")]
    pub winner: Option<WinnerRef>,
    #[serde(deserialize_with = "lenient")]
    pub result: Option<CompetitionResult>,
    #[serde(deserialize_with = "lenient")]
    pub venue: Option<Venue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Named {
    #[serde(deserialize_with = "lenient_text")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
}

impl Named {
    fn label(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.description.as_deref())
            .or(self.name.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Competitor {
    #[serde(deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub winner: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub athlete: Option<Athlete>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Athlete {
    #[serde(deserialize_with = "lenient_text")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub flag: Option<Flag>,
    #[serde(deserialize_with = "lenient")]
    pub record: Option<DisplayValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Flag {
    #[serde(deserialize_with = "lenient_text")]
    pub alt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplayValue {
    #[serde(deserialize_with = "lenient_text")]
    pub display_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CompetitionStatus {
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: Option<StatusType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatusType {
    #[serde(deserialize_with = "lenient")]
    pub completed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WinnerRef {
    #[serde(deserialize_with = "lenient_text")]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CompetitionResult {
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Venue {
    #[serde(deserialize_with = "lenient_text")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Address {
    #[serde(deserialize_with = "lenient_text")]
    pub city: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub state: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub country: Option<String>,
}

impl Address {
    fn joined(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim).filter(|p| !p.is_empty()))
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

impl EspnEvent {
    /// Local event date of the ISO timestamp ("2024-04-13T22:00Z").
    pub fn calendar_date(&self) -> Option<NaiveDate> {
        self.date.as_deref().and_then(date_from_iso_timestamp)
    }

    /// Competitions that decode; malformed entries are logged and skipped.
    pub fn competitions(&self) -> Vec<Competition> {
        self.competitions
            .iter()
            .cloned()
            .filter_map(|value| decode_item(value, "competition"))
            .collect()
    }
}

fn venue(competitions: &[Competition]) -> Option<&Venue> {
    competitions.iter().find_map(|c| c.venue.as_ref())
}

fn venue_name(competitions: &[Competition]) -> Option<String> {
    venue(competitions)?.full_name.clone()
}

fn venue_location(competitions: &[Competition]) -> Option<String> {
    venue(competitions)?.address.as_ref()?.joined()
}

pub fn event_page_url(event_id: &str) -> String {
    format!("{EVENT_PAGE_URL}/{event_id}")
}

pub fn parse_event_list(body: &str) -> Result<Vec<CandidateEvent>, AdapterError> {
    let list: EventList = serde_json::from_str(body)?;
    let mut candidates = Vec::with_capacity(list.events.len());
    for value in list.events {
        let Some(event) = decode_item::<EspnEvent>(value, "event") else {
            continue;
        };
        let (Some(id), Some(name)) = (event.id.clone(), event.name.clone()) else {
            warn!(source = %SourceTag::EspnMma, "skipping event without id or name");
            continue;
        };
        let competitions = event.competitions();
        candidates.push(CandidateEvent {
            date: event.calendar_date(),
            venue: venue_name(&competitions),
            location: venue_location(&competitions),
            url: event_page_url(&id),
            id,
            name,
            source: SourceTag::EspnMma,
        });
    }
    Ok(candidates)
}

fn competition_draft(competition: &Competition) -> Option<BoutDraft> {
    let competitors: Vec<Competitor> = competition
        .competitors
        .iter()
        .cloned()
        .filter_map(|value| decode_item(value, "competitor"))
        .collect();
    let [red, blue, ..] = competitors.as_slice() else {
        return None;
    };
    let corner = |competitor: &Competitor| {
        let athlete = competitor.athlete.as_ref();
        Corner {
            raw_name: athlete
                .and_then(|a| a.display_name.clone())
                .unwrap_or_default(),
            record: athlete
                .and_then(|a| a.record.as_ref())
                .and_then(|r| r.display_value.clone()),
            country: athlete
                .and_then(|a| a.flag.as_ref())
                .and_then(|f| f.alt.clone()),
        }
    };

    let completed = competition
        .status
        .as_ref()
        .and_then(|s| s.kind.as_ref())
        .and_then(|kind| kind.completed)
        .unwrap_or(false);
    let winner_id = competition.winner.as_ref().and_then(|w| w.id.as_deref());
    let outcome = if !completed {
        Outcome::Pending
    } else if red.winner == Some(true) || (winner_id.is_some() && winner_id == red.id.as_deref()) {
        Outcome::Fighter1Won
    } else if blue.winner == Some(true) || (winner_id.is_some() && winner_id == blue.id.as_deref())
    {
        Outcome::Fighter2Won
    } else {
        Outcome::NoWinner
    };

    let weight_class = competition
        .weight_class
        .as_ref()
        .and_then(Named::label)
        .unwrap_or("Unknown")
        .to_string();
    let title = competition.title_bout.unwrap_or(false).then(|| {
        if weight_class.to_lowercase().contains("interim") {
            TitleFight::Interim
        } else {
            TitleFight::Undisputed
        }
    });

    Some(BoutDraft {
        fighter1: corner(red),
        fighter2: corner(blue),
        segment: competition
            .card_segment
            .as_ref()
            .and_then(Named::label)
            .and_then(classify_segment_header)
            .unwrap_or_default(),
        outcome,
        method: completed
            .then(|| competition.result.as_ref().and_then(|r| r.description.clone()))
            .flatten(),
        weight_class,
        title,
        ..BoutDraft::default()
    })
}

#[derive(Debug)]
pub struct EventDetail {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub fights: Vec<cagecard_core::Fight>,
}

/// `None` when the envelope carries no event.
pub fn parse_event_detail(
    body: &str,
    order: CardOrder,
    registry: Option<&FighterRegistry>,
) -> Result<Option<EventDetail>, AdapterError> {
    let envelope: EventEnvelope = serde_json::from_str(body)?;
    let Some(event) = envelope
        .event
        .and_then(|value| decode_item::<EspnEvent>(value, "event"))
    else {
        return Ok(None);
    };

    let competitions = event.competitions();
    let mut drafts = Vec::with_capacity(competitions.len());
    for competition in &competitions {
        match competition_draft(competition) {
            Some(draft) => drafts.push(draft),
            None => warn!(
                source = %SourceTag::EspnMma,
                competitors = competition.competitors.len(),
                "skipping competition without two competitors"
            ),
        }
    }

    Ok(Some(EventDetail {
        name: event.name.clone(),
        date: event.calendar_date(),
        venue: venue_name(&competitions),
        location: venue_location(&competitions),
        fights: assemble_card(drafts, order, registry),
    }))
}

pub struct EspnAdapter {
    ctx: AdapterContext,
    base_url: String,
    card_order: CardOrder,
}

impl EspnAdapter {
    pub fn new(ctx: AdapterContext, settings: &SourceSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL).to_string(),
            card_order: settings.card_order,
            ctx,
        }
    }
}

#[async_trait]
impl SourceAdapter for EspnAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::EspnMma
    }

    async fn discover(
        &self,
        mode: DiscoveryMode,
        since: Option<NaiveDate>,
    ) -> Result<Vec<CandidateEvent>, AdapterError> {
        let url = format!("{}/events?limit={LIST_LIMIT}", self.base_url);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            warn!(url, "espn events endpoint not found");
            return Ok(Vec::new());
        };
        let candidates = parse_event_list(&body)?;
        Ok(filter_candidates(self.source(), candidates, mode, since, self.ctx.today))
    }

    async fn extract(&self, event_id: &str) -> Result<Option<UfcEvent>, AdapterError> {
        let url = format!("{}/events/{event_id}", self.base_url);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            return Ok(None);
        };
        let Some(detail) = parse_event_detail(&body, self.card_order, self.ctx.registry())? else {
            warn!(event_id, "espn response carried no event");
            return Ok(None);
        };

        let event_date = detail.date.unwrap_or_else(|| {
            warn!(event_id, "event date missing, using today");
            self.ctx.today
        });
        let mut event = UfcEvent {
            event_id: event_id.to_string(),
            event_name: detail.name.unwrap_or_else(|| event_id.to_string()),
            event_date,
            venue: detail.venue,
            location: detail.location,
            status: EventStatus::from_date(event_date, self.ctx.today),
            attendance: None,
            fights: detail.fights,
            scraped_at: Utc::now(),
            source_urls: Default::default(),
        };
        event.source_urls.insert(self.source(), event_page_url(event_id));
        info!(event_id, fights = event.fights.len(), "extracted espn event");
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use cagecard_core::Segment;

    use super::*;

    const DETAIL: &str = r#"{
      "event": {
        "id": 600041234,
        "name": "UFC 300: Pereira vs. Hill",
        "date": "2024-04-13T22:00Z",
        "competitions": [
          {
            "competitors": [
              {"id": "11", "athlete": {"displayName": "Bo Nickal", "record": {"displayValue": "6-0-0"}}},
              {"id": "12", "athlete": {"displayName": "Cody Brundage"}}
            ],
            "weightClass": {"displayName": "Middleweight"},
            "cardSegment": {"description": "Prelims"},
            "status": {"type": {"completed": true}},
            "winner": {"id": "11"},
            "result": {"description": "Submission"}
          },
          {
            "competitors": [
              {"id": 21, "athlete": {"displayName": "Alex Pereira", "flag": {"alt": "Brazil"}}},
              {"id": 22, "winner": false, "athlete": {"displayName": "Jamahal Hill"}}
            ],
            "weightClass": {"displayName": "Light Heavyweight"},
            "titleBout": true,
            "status": {"type": {"completed": false}},
            "venue": {"fullName": "T-Mobile Arena", "address": {"city": "Las Vegas", "state": "NV", "country": "USA"}}
          },
          {"competitors": [{"id": "99", "athlete": {"displayName": "Solo"}}]}
        ]
      }
    }"#;

    #[test]
    fn detail_maps_competitions_to_fights() {
        let detail = parse_event_detail(DETAIL, CardOrder::MainEventLast, None)
            .unwrap()
            .unwrap();
        assert_eq!(detail.date, NaiveDate::from_ymd_opt(2024, 4, 13));
        assert_eq!(detail.venue.as_deref(), Some("T-Mobile Arena"));
        assert_eq!(detail.location.as_deref(), Some("Las Vegas, NV, USA"));
        assert_eq!(detail.fights.len(), 2);

        let main = &detail.fights[0];
        assert_eq!(main.fighter1.name, "Alex Pereira");
        assert_eq!(main.title_fight, TitleFight::Undisputed);
        assert_eq!(main.fighter1.country.as_deref(), Some("Brazil"));
        assert_eq!(main.winner, None);

        let opener = &detail.fights[1];
        assert_eq!(opener.segment, Segment::Prelims);
        assert_eq!(opener.winner.as_deref(), Some("Bo Nickal"));
        assert_eq!(opener.fighter1.record.as_deref(), Some("6-0-0"));
        assert_eq!(opener.bout_order, 2);
    }

    #[test]
    fn list_skips_entries_without_ids() {
        let body = r#"{"events": [
            {"id": "1", "name": "UFC 301", "date": "2024-05-04T21:00Z"},
            {"name": "No id"},
            {"id": "3", "name": "UFC 302"}
        ]}"#;
        let events = parse_event_list(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].url, "https://www.espn.com/mma/event/_/id/1");
        assert_eq!(events[1].date, None);
    }

    #[test]
    fn empty_envelope_is_not_an_error() {
        assert!(parse_event_detail("{}", CardOrder::MainEventLast, None)
            .unwrap()
            .is_none());
        assert!(parse_event_list("not json").is_err());
    }

    #[test]
    fn malformed_list_entries_do_not_sink_the_listing() {
        let body = r#"{"events": [
            {"id": "1", "name": 301, "date": "2024-05-04T21:00Z"},
            "not an event",
            {"id": "2", "name": "UFC 301: Pantoja vs. Erceg", "date": "2024-05-05T02:00Z",
             "competitions": [{"venue": "Rio"}, 7, {"venue": {"fullName": "Farmasi Arena"}}]},
            {"id": {"nested": true}, "name": "Bad id"}
        ]}"#;
        let events = parse_event_list(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "301");

        let ufc_301 = &events[1];
        assert_eq!(ufc_301.id, "2");
        assert_eq!(ufc_301.date, NaiveDate::from_ymd_opt(2024, 5, 4));
        assert_eq!(ufc_301.venue.as_deref(), Some("Farmasi Arena"));
    }

    #[test]
    fn null_and_mistyped_fields_read_as_absent() {
        let body = r#"{"event": {
            "id": "600041300",
            "name": "UFC 302",
            "date": "2024-06-02T01:00Z",
            "competitions": [
              {
                "competitors": [
                  {"id": "1", "athlete": {"displayName": "Islam Makhachev"}},
                  {"id": "2", "athlete": {"displayName": "Dustin Poirier", "record": "30-8"}}
                ],
                "titleBout": null,
                "status": {"type": {"completed": "yes"}},
                "weightClass": 155
              },
              "garbage"
            ]
        }}"#;
        let detail = parse_event_detail(body, CardOrder::MainEventFirst, None)
            .unwrap()
            .unwrap();
        assert_eq!(detail.date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(detail.fights.len(), 1);

        let fight = &detail.fights[0];
        assert_eq!(fight.fighter1.name, "Islam Makhachev");
        assert_eq!(fight.fighter2.name, "Dustin Poirier");
        assert_eq!(fight.title_fight, TitleFight::None);
        assert_eq!(fight.weight_class, "Unknown");
        assert_eq!(fight.winner, None);
    }
}
