//! Wikipedia: the primary source. Event list tables, event infoboxes and results tables.

use async_trait::async_trait;
use cagecard_core::{
    CandidateEvent, CardOrder, DiscoveryMode, EventStatus, Fight, Segment, SourceTag, UfcEvent,
};
use chrono::{NaiveDate, Utc};
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::fight_card::{
    apply_bonuses, assemble_card, extract_card, BonusAwards, BoutDraft, CardRow,
};
use crate::fighters::FighterRegistry;
use crate::strategy::{first_matching, SelectorStrategy};
use crate::text::parse_date;
use crate::{
    absolute_url, filter_candidates, last_path_segment, node_text, select_first_text, selector,
    text_or_none, warn_skipped, AdapterContext, AdapterError, SourceAdapter, SourceSettings,
};

pub const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";
pub const EVENTS_LIST_PATH: &str = "/wiki/List_of_UFC_events";

const EVENT_TABLES: [SelectorStrategy; 3] = [
    SelectorStrategy::new("event tables by id", "table#Scheduled_events, table#Past_events"),
    SelectorStrategy::new("wikitables", "table.wikitable"),
    SelectorStrategy::new("any table", "table"),
];

pub struct WikipediaAdapter {
    ctx: AdapterContext,
    base_url: String,
    card_order: CardOrder,
}

impl WikipediaAdapter {
    pub fn new(ctx: AdapterContext, settings: &SourceSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL).to_string(),
            card_order: settings.card_order,
            ctx,
        }
    }

    pub fn event_url(&self, event_id: &str) -> String {
        format!("{}/wiki/{event_id}", self.base_url)
    }
}

#[async_trait]
impl SourceAdapter for WikipediaAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Wikipedia
    }

    async fn discover(
        &self,
        mode: DiscoveryMode,
        since: Option<NaiveDate>,
    ) -> Result<Vec<CandidateEvent>, AdapterError> {
        let url = format!("{}{EVENTS_LIST_PATH}", self.base_url);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            warn!(url, "event list page not found");
            return Ok(Vec::new());
        };
        let candidates = parse_events_list(&body, &self.base_url)?;
        Ok(filter_candidates(self.source(), candidates, mode, since, self.ctx.today))
    }

    async fn extract(&self, event_id: &str) -> Result<Option<UfcEvent>, AdapterError> {
        let url = self.event_url(event_id);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            return Ok(None);
        };
        let page = parse_event_page(&body, self.card_order, self.ctx.registry())?;

        let event_date = page.date.unwrap_or_else(|| {
            warn!(event_id, "event date missing from infobox, using today");
            self.ctx.today
        });
        let mut event = UfcEvent {
            event_id: event_id.to_string(),
            event_name: page.name.unwrap_or_else(|| event_id.replace('_', " ")),
            event_date,
            venue: page.venue,
            location: page.location,
            status: EventStatus::from_date(event_date, self.ctx.today),
            attendance: page.attendance,
            fights: page.fights,
            scraped_at: Utc::now(),
            source_urls: Default::default(),
        };
        event.source_urls.insert(self.source(), url);
        info!(event_id, fights = event.fights.len(), "extracted wikipedia event");
        Ok(Some(event))
    }
}

/// Candidate events from the scheduled and past event tables.
pub fn parse_events_list(html: &str, base_url: &str) -> Result<Vec<CandidateEvent>, AdapterError> {
    let document = Html::parse_document(html);
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;
    let link_sel = selector(r#"a[href*="/wiki/UFC"]"#)?;

    let Some((_, tables)) = first_matching(document.root_element(), &EVENT_TABLES)? else {
        return Ok(Vec::new());
    };

    let mut events = Vec::new();
    for table in tables {
        let mut rows = table.select(&row_sel);
        let Some(header) = rows.next() else {
            continue;
        };
        let header_text = node_text(header).to_lowercase();
        if !["event", "date", "venue"].iter().any(|k| header_text.contains(k)) {
            continue;
        }

        for row in rows {
            let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
            if cells.len() < 3 {
                continue;
            }
            match parse_event_row(&cells, &link_sel, base_url) {
                Some(event) => events.push(event),
                None => warn_skipped(SourceTag::Wikipedia, "event row", &node_text(row)),
            }
        }
    }
    debug!(events = events.len(), "parsed wikipedia event list");
    Ok(events)
}

fn parse_event_row(
    cells: &[ElementRef<'_>],
    link_sel: &scraper::Selector,
    base_url: &str,
) -> Option<CandidateEvent> {
    if cells.len() < 4 {
        return None;
    }
    // Past events carry a leading "#" column.
    let first = node_text(cells[0]);
    let numbered = !first.is_empty() && first.chars().all(|c| c.is_ascii_digit());
    let (event_col, date_col, venue_col, location_col) = if numbered {
        if cells.len() < 5 {
            return None;
        }
        (1, 2, 3, 4)
    } else {
        (0, 1, 2, 3)
    };

    let link = cells[event_col].select(link_sel).next()?;
    let href = link.value().attr("href")?;
    let name = text_or_none(node_text(link))?;

    Some(CandidateEvent {
        id: last_path_segment(href),
        name,
        date: parse_date(&node_text(cells[date_col])),
        venue: text_or_none(node_text(cells[venue_col])),
        location: text_or_none(node_text(cells[location_col])),
        source: SourceTag::Wikipedia,
        url: absolute_url(base_url, href),
    })
}

#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub attendance: Option<u32>,
    pub fights: Vec<Fight>,
}

/// Event header, fight card and bonuses from an event article.
pub fn parse_event_page(
    html: &str,
    order: CardOrder,
    registry: Option<&FighterRegistry>,
) -> Result<EventPage, AdapterError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut page = EventPage {
        name: select_first_text(root, "h1#firstHeading")?,
        ..EventPage::default()
    };
    read_infobox(root, &mut page)?;

    let mut drafts = extract_card(&card_rows(root)?);
    if drafts.is_empty() {
        drafts = results_text_drafts(root)?;
        if !drafts.is_empty() {
            debug!(bouts = drafts.len(), "fight card parsed from results text");
        }
    }
    page.fights = assemble_card(drafts, order, registry);

    let bonus_lines = section_items(root, "bonus award")?;
    let awards = BonusAwards::from_lines(bonus_lines.iter().map(String::as_str));
    if !awards.is_empty() {
        apply_bonuses(&mut page.fights, &awards);
    }
    Ok(page)
}

fn read_infobox(root: ElementRef<'_>, page: &mut EventPage) -> Result<(), AdapterError> {
    let row_sel = selector("table.infobox tr")?;
    let label_sel = selector("th")?;
    let value_sel = selector("td")?;

    for row in root.select(&row_sel) {
        let Some(label) = row.select(&label_sel).next().map(|th| node_text(th).to_lowercase())
        else {
            continue;
        };
        let Some(value) = row.select(&value_sel).last().map(node_text) else {
            continue;
        };

        if label.contains("date") && page.date.is_none() {
            page.date = parse_date(&value);
        } else if label.contains("venue") && page.venue.is_none() {
            page.venue = text_or_none(value);
        } else if (label.contains("city") || label.contains("location")) && page.location.is_none() {
            page.location = text_or_none(value);
        } else if label.contains("attendance") && page.attendance.is_none() {
            let digits: String = value
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ',')
                .filter(char::is_ascii_digit)
                .collect();
            page.attendance = digits.parse().ok();
        }
    }
    Ok(())
}

fn is_heading(element: ElementRef<'_>) -> bool {
    matches!(element.value().name(), "h2" | "h3" | "h4")
}

fn table_rows(table: ElementRef<'_>) -> Result<Vec<CardRow>, AdapterError> {
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;
    Ok(table
        .select(&row_sel)
        .map(|row| CardRow::new(row.select(&cell_sel).map(node_text)))
        .collect())
}

/// Results table: a `toccolours` table, else the first table after a fight card heading.
fn card_rows(root: ElementRef<'_>) -> Result<Vec<CardRow>, AdapterError> {
    let strategies = [SelectorStrategy::new("toccolours results table", "table.toccolours")];
    if let Some((_, tables)) = first_matching(root, &strategies)? {
        return table_rows(tables[0]);
    }

    let walk = selector("h2, h3, h4, table")?;
    let mut in_card_section = false;
    for element in root.select(&walk) {
        if is_heading(element) {
            let heading = node_text(element).to_lowercase();
            in_card_section = heading.contains("fight card") || heading.contains("results");
        } else if in_card_section {
            debug!("results table found under fight card heading");
            return table_rows(element);
        }
    }
    Ok(Vec::new())
}

/// List items and paragraphs under the first heading containing `heading`.
fn section_items(root: ElementRef<'_>, heading: &str) -> Result<Vec<String>, AdapterError> {
    let walk = selector("h2, h3, h4, table, li, p")?;
    let mut items = Vec::new();
    let mut inside = false;

    for element in root.select(&walk) {
        if is_heading(element) {
            if inside {
                break;
            }
            inside = node_text(element).to_lowercase().contains(heading);
            continue;
        }
        if !inside {
            continue;
        }
        if element.value().name() == "table" {
            break;
        }
        if let Some(text) = text_or_none(node_text(element)) {
            items.push(text);
        }
    }
    Ok(items)
}

fn results_text_drafts(root: ElementRef<'_>) -> Result<Vec<BoutDraft>, AdapterError> {
    Ok(section_items(root, "results")?
        .iter()
        .filter_map(|line| BoutDraft::from_text(line, Segment::MainCard))
        .collect())
}
