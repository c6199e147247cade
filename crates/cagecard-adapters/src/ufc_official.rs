//! UFC.com event listings and fight cards.

use std::collections::HashSet;

use async_trait::async_trait;
use cagecard_core::{
    CandidateEvent, CardOrder, DiscoveryMode, EventStatus, Fight, Segment, SourceTag, UfcEvent,
};
use chrono::{NaiveDate, Utc};
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::fight_card::{assemble_card, classify_segment_header, BoutDraft, Corner, Outcome};
use crate::fighters::FighterRegistry;
use crate::strategy::{first_matching, SelectorStrategy};
use crate::text::{date_from_unix_seconds, parse_date};
use crate::{
    absolute_url, filter_candidates, last_path_segment, node_text, select_first_attr,
    select_first_text, selector, text_or_none, warn_skipped, AdapterContext, AdapterError,
    SourceAdapter, SourceSettings,
};

pub const DEFAULT_BASE_URL: &str = "https://www.ufc.com";
pub const EVENTS_PATH: &str = "/events";

const EVENT_CARDS: [SelectorStrategy; 5] = [
    SelectorStrategy::new("event cards", ".c-card-event"),
    SelectorStrategy::new("legacy event cards", ".event-card"),
    SelectorStrategy::new("fight listings", ".c-listing-fight"),
    SelectorStrategy::new("article cards", "article.c-card"),
    SelectorStrategy::new("views rows", ".view-events .views-row"),
];

const FIGHT_ITEMS: [SelectorStrategy; 3] = [
    SelectorStrategy::new("listing fights", ".c-listing-fight"),
    SelectorStrategy::new("listing items", ".l-listing__item"),
    SelectorStrategy::new("fight card fights", ".fight-card__fight"),
];

const FIGHTER_NAMES: [SelectorStrategy; 3] = [
    SelectorStrategy::new("corner names", ".c-listing-fight__corner-name").at_least(2),
    SelectorStrategy::new("fighter names", ".c-listing-fight__fighter-name").at_least(2),
    SelectorStrategy::new("legacy fighter names", ".fight-card__fighter-name").at_least(2),
];

const SEGMENT_SECTIONS: [(Segment, &str); 3] = [
    (Segment::MainCard, "#main-card, .main-card"),
    (Segment::Prelims, "#prelims, .prelims, .fight-card-prelims"),
    (Segment::EarlyPrelims, "#early-prelims, .early-prelims, .fight-card-prelims-early"),
];

const NAME_SELECTORS: [&str; 4] = [
    "h1.hero-profile__name",
    "h1.c-hero__headline",
    ".event-header__title",
    "h1",
];
const DATE_SELECTORS: [&str; 4] = [
    ".c-hero__headline-suffix",
    ".hero-profile__info .c-listing-fight__date",
    ".c-hero__info .c-listing-fight__date",
    ".event-header__date",
];
const VENUE_SELECTORS: [&str; 4] = [
    ".hero-profile__info .c-listing-fight__venue",
    ".c-hero__info .c-listing-fight__venue",
    ".event-header__venue",
    ".field--name-venue",
];
const LOCATION_SELECTORS: [&str; 4] = [
    ".hero-profile__info .c-listing-fight__location",
    ".c-hero__info .c-listing-fight__location",
    ".event-header__location",
    ".field--name-location",
];

pub struct UfcOfficialAdapter {
    ctx: AdapterContext,
    base_url: String,
    card_order: CardOrder,
}

impl UfcOfficialAdapter {
    pub fn new(ctx: AdapterContext, settings: &SourceSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL).to_string(),
            card_order: settings.card_order,
            ctx,
        }
    }

    pub fn event_url(&self, event_id: &str) -> String {
        format!("{}/event/{event_id}", self.base_url)
    }
}

#[async_trait]
impl SourceAdapter for UfcOfficialAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::UfcOfficial
    }

    async fn discover(
        &self,
        mode: DiscoveryMode,
        since: Option<NaiveDate>,
    ) -> Result<Vec<CandidateEvent>, AdapterError> {
        let url = format!("{}{EVENTS_PATH}", self.base_url);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            warn!(url, "events page not found");
            return Ok(Vec::new());
        };
        let candidates = parse_events_page(&body, &self.base_url)?;
        Ok(filter_candidates(self.source(), candidates, mode, since, self.ctx.today))
    }

    async fn extract(&self, event_id: &str) -> Result<Option<UfcEvent>, AdapterError> {
        let url = self.event_url(event_id);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            return Ok(None);
        };
        let page = parse_event_page(&body, self.card_order, self.ctx.registry())?;

        let event_date = page.date.unwrap_or_else(|| {
            warn!(event_id, "event date missing, using today");
            self.ctx.today
        });
        let mut event = UfcEvent {
            event_id: event_id.to_string(),
            event_name: page.name.unwrap_or_else(|| event_id.to_string()),
            event_date,
            venue: page.venue,
            location: page.location,
            status: EventStatus::from_date(event_date, self.ctx.today),
            attendance: None,
            fights: page.fights,
            scraped_at: Utc::now(),
            source_urls: Default::default(),
        };
        event.source_urls.insert(self.source(), url);
        info!(event_id, fights = event.fights.len(), "extracted ufc.com event");
        Ok(Some(event))
    }
}

fn element_date(scope: ElementRef<'_>) -> Result<Option<NaiveDate>, AdapterError> {
    for attr in ["data-main-card-timestamp", "data-timestamp"] {
        let css = format!("[{attr}]");
        let own = scope.value().attr(attr).map(str::to_string);
        let nested = select_first_attr(scope, &css, attr)?;
        if let Some(date) = own.or(nested).as_deref().and_then(date_from_unix_seconds) {
            return Ok(Some(date));
        }
    }
    Ok(None)
}

pub fn parse_events_page(html: &str, base_url: &str) -> Result<Vec<CandidateEvent>, AdapterError> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let link_sel = selector(r#"a[href*="/event/"]"#)?;

    let mut events = Vec::new();
    let mut seen = HashSet::new();

    match first_matching(root, &EVENT_CARDS)? {
        Some((_, cards)) => {
            for card in cards {
                match parse_event_card(card, base_url)? {
                    Some(event) if seen.insert(event.id.clone()) => events.push(event),
                    Some(_) => {}
                    None => warn_skipped(SourceTag::UfcOfficial, "event card", &node_text(card)),
                }
            }
        }
        None => {
            debug!("no event cards, falling back to event links");
            for link in root.select(&link_sel) {
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                let id = last_path_segment(href);
                if id.is_empty() || !seen.insert(id.clone()) {
                    continue;
                }
                let name = text_or_none(node_text(link)).unwrap_or_else(|| id.clone());
                events.push(CandidateEvent {
                    date: parse_date(&name),
                    id,
                    name,
                    venue: None,
                    location: None,
                    source: SourceTag::UfcOfficial,
                    url: absolute_url(base_url, href),
                });
            }
        }
    }
    debug!(events = events.len(), "parsed ufc.com events page");
    Ok(events)
}

fn parse_event_card(
    card: ElementRef<'_>,
    base_url: &str,
) -> Result<Option<CandidateEvent>, AdapterError> {
    let link_sel = selector(r#"a[href*="/event/"]"#)?;
    let Some(link) = card.select(&link_sel).next() else {
        return Ok(None);
    };
    let Some(href) = link.value().attr("href") else {
        return Ok(None);
    };
    let id = last_path_segment(href);
    if id.is_empty() {
        return Ok(None);
    }

    let headline = select_first_text(card, ".c-card-event--result__headline, .c-card__headline")?;
    let name = headline
        .or_else(|| text_or_none(node_text(link)))
        .unwrap_or_else(|| id.clone());

    let date = match element_date(card)? {
        Some(date) => Some(date),
        None => select_first_text(card, ".c-card-event--result__date, .c-card__date")?
            .as_deref()
            .and_then(parse_date)
            .or_else(|| parse_date(&node_text(card))),
    };

    Ok(Some(CandidateEvent {
        id,
        name,
        date,
        venue: select_first_text(card, ".field--name-venue, .c-card-event--result__venue")?,
        location: select_first_text(card, ".field--name-location, .c-card-event--result__location")?,
        source: SourceTag::UfcOfficial,
        url: absolute_url(base_url, href),
    }))
}

#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub fights: Vec<Fight>,
}

fn first_text(root: ElementRef<'_>, candidates: &[&str]) -> Result<Option<String>, AdapterError> {
    for css in candidates {
        if let Some(text) = select_first_text(root, css)? {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

pub fn parse_event_page(
    html: &str,
    order: CardOrder,
    registry: Option<&FighterRegistry>,
) -> Result<EventPage, AdapterError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let date = match element_date(root)? {
        Some(date) => Some(date),
        None => first_text(root, &DATE_SELECTORS)?.as_deref().and_then(parse_date),
    };

    let drafts = fight_drafts(root)?;
    Ok(EventPage {
        name: first_text(root, &NAME_SELECTORS)?,
        date,
        venue: first_text(root, &VENUE_SELECTORS)?,
        location: first_text(root, &LOCATION_SELECTORS)?,
        fights: assemble_card(drafts, order, registry),
    })
}

/// Segment containers first, then fights grouped under headings, then every fight on the page.
fn fight_drafts(root: ElementRef<'_>) -> Result<Vec<BoutDraft>, AdapterError> {
    let mut elements: Vec<(Segment, ElementRef<'_>)> = Vec::new();
    for (segment, css) in SEGMENT_SECTIONS {
        let sel = selector(css)?;
        let Some(section) = root.select(&sel).next() else {
            continue;
        };
        if let Some((_, fights)) = first_matching(section, &FIGHT_ITEMS)? {
            elements.extend(fights.into_iter().map(|fight| (segment, fight)));
        }
    }

    if elements.is_empty() {
        elements = heading_grouped(root)?;
    }
    if elements.is_empty() {
        if let Some((_, fights)) = first_matching(root, &FIGHT_ITEMS)? {
            elements = fights.into_iter().map(|f| (Segment::MainCard, f)).collect();
        }
    }

    let mut drafts = Vec::with_capacity(elements.len());
    for (segment, element) in elements {
        match parse_fight_element(element, segment)? {
            Some(draft) => drafts.push(draft),
            None => warn_skipped(SourceTag::UfcOfficial, "fight listing", &node_text(element)),
        }
    }
    Ok(drafts)
}

fn heading_grouped(root: ElementRef<'_>) -> Result<Vec<(Segment, ElementRef<'_>)>, AdapterError> {
    let walk = selector("h2, h3, h4, .c-listing-fight")?;
    let mut current: Option<Segment> = None;
    let mut grouped = Vec::new();
    for element in root.select(&walk) {
        if matches!(element.value().name(), "h2" | "h3" | "h4") {
            current = classify_segment_header(&node_text(element));
        } else if let Some(segment) = current {
            grouped.push((segment, element));
        }
    }
    Ok(grouped)
}

fn corner_won(element: ElementRef<'_>, corner: &str) -> Result<bool, AdapterError> {
    let css = format!(".c-listing-fight__corner--{corner} .c-listing-fight__outcome--win");
    let sel = selector(&css)?;
    Ok(element.select(&sel).next().is_some())
}

fn parse_fight_element(
    element: ElementRef<'_>,
    segment: Segment,
) -> Result<Option<BoutDraft>, AdapterError> {
    let Some((_, names)) = first_matching(element, &FIGHTER_NAMES)? else {
        return Ok(None);
    };
    let (Some(name1), Some(name2)) = (
        text_or_none(node_text(names[0])),
        text_or_none(node_text(names[1])),
    ) else {
        return Ok(None);
    };

    let country_sel = selector(".c-listing-fight__country-text")?;
    let mut countries = element.select(&country_sel).map(|c| text_or_none(node_text(c)));

    let outcome = if corner_won(element, "red")? {
        Outcome::Fighter1Won
    } else if corner_won(element, "blue")? {
        Outcome::Fighter2Won
    } else if select_first_text(
        element,
        ".c-listing-fight__outcome--draw, .c-listing-fight__outcome--no-contest",
    )?
    .is_some()
    {
        Outcome::NoWinner
    } else {
        Outcome::Pending
    };

    let weight_class = match select_first_text(element, ".c-listing-fight__class-text")? {
        Some(class) => class,
        None => select_first_text(element, ".fight-card__weight-class")?
            .unwrap_or_else(|| "Unknown".to_string()),
    };

    Ok(Some(BoutDraft {
        fighter1: Corner {
            raw_name: name1,
            record: None,
            country: countries.next().flatten(),
        },
        fighter2: Corner {
            raw_name: name2,
            record: None,
            country: countries.next().flatten(),
        },
        weight_class,
        segment,
        outcome,
        method: select_first_text(element, ".c-listing-fight__result-text.method")?,
        round: select_first_text(element, ".c-listing-fight__result-text.round")?,
        time: select_first_text(element, ".c-listing-fight__result-text.time")?,
        title: None,
    }))
}
