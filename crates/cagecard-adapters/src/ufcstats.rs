//! UFCStats: completed events only.

use async_trait::async_trait;
use cagecard_core::{CandidateEvent, CardOrder, DiscoveryMode, EventStatus, SourceTag, UfcEvent};
use chrono::{NaiveDate, Utc};
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::fight_card::{assemble_card, BoutDraft, Corner, Outcome};
use crate::fighters::FighterRegistry;
use crate::strategy::{first_matching, SelectorStrategy};
use crate::text::{parse_date, title_from_weight_class};
use crate::{
    absolute_url, filter_candidates, last_path_segment, node_text, select_first_text, selector,
    text_or_none, warn_skipped, AdapterContext, AdapterError, SourceAdapter, SourceSettings,
};

pub const DEFAULT_BASE_URL: &str = "http://ufcstats.com";
pub const EVENTS_LIST_PATH: &str = "/statistics/events/completed?page=all";

const EVENT_ROWS: [SelectorStrategy; 3] = [
    SelectorStrategy::new("statistics rows", "tr.b-statistics__table-row").at_least(2),
    SelectorStrategy::new("table body rows", "tbody tr").at_least(2),
    SelectorStrategy::new("any table rows", "table tr").at_least(2),
];

const FIGHT_ROWS: [SelectorStrategy; 2] = [
    SelectorStrategy::new("fight detail rows", "tr.b-fight-details__table-row"),
    SelectorStrategy::new("fight table rows", "table tbody tr"),
];

pub struct UfcStatsAdapter {
    ctx: AdapterContext,
    base_url: String,
    card_order: CardOrder,
}

impl UfcStatsAdapter {
    pub fn new(ctx: AdapterContext, settings: &SourceSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL).to_string(),
            card_order: settings.card_order,
            ctx,
        }
    }

    pub fn event_url(&self, event_id: &str) -> String {
        format!("{}/event-details/{event_id}", self.base_url)
    }
}

#[async_trait]
impl SourceAdapter for UfcStatsAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::UfcStats
    }

    async fn discover(
        &self,
        mode: DiscoveryMode,
        since: Option<NaiveDate>,
    ) -> Result<Vec<CandidateEvent>, AdapterError> {
        if mode == DiscoveryMode::Future {
            debug!("ufcstats lists completed events only");
            return Ok(Vec::new());
        }
        let url = format!("{}{EVENTS_LIST_PATH}", self.base_url);
        let Some(body) = self.ctx.fetch_text(self.source(), &url).await? else {
            warn!(url, "completed events page not found");
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
            warn!(event_id, "event date missing, using today");
            self.ctx.today
        });
        let mut event = UfcEvent {
            event_id: event_id.to_string(),
            event_name: page.name.unwrap_or_else(|| event_id.to_string()),
            event_date,
            venue: None,
            location: page.location,
            status: EventStatus::Completed,
            attendance: None,
            fights: page.fights,
            scraped_at: Utc::now(),
            source_urls: Default::default(),
        };
        event.source_urls.insert(self.source(), url);
        info!(event_id, fights = event.fights.len(), "extracted ufcstats event");
        Ok(Some(event))
    }
}

pub fn parse_events_list(html: &str, base_url: &str) -> Result<Vec<CandidateEvent>, AdapterError> {
    let document = Html::parse_document(html);
    let link_sel = selector(r#"a[href*="/event-details/"]"#)?;
    let date_sel = selector("span.b-statistics__date")?;
    let cell_sel = selector("td, th")?;

    let Some((_, rows)) = first_matching(document.root_element(), &EVENT_ROWS)? else {
        warn!("no event rows on ufcstats list page");
        return Ok(Vec::new());
    };

    let mut events = Vec::new();
    for row in rows {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.len() < 2 {
            continue;
        }
        let Some(link) = row.select(&link_sel).next() else {
            // header and spacer rows
            continue;
        };
        let (Some(href), Some(name)) = (link.value().attr("href"), text_or_none(node_text(link)))
        else {
            warn_skipped(SourceTag::UfcStats, "event row", &node_text(row));
            continue;
        };

        let date = row
            .select(&date_sel)
            .next()
            .and_then(|span| parse_date(&node_text(span)))
            .or_else(|| cells.iter().find_map(|cell| parse_date(&node_text(*cell))));
        let location = cells
            .iter()
            .map(|cell| node_text(*cell))
            .find(|text| text.contains(',') && !text.contains(&name) && parse_date(text).is_none());

        events.push(CandidateEvent {
            id: last_path_segment(href),
            name,
            date,
            venue: None,
            location,
            source: SourceTag::UfcStats,
            url: absolute_url(base_url, href),
        });
    }
    debug!(events = events.len(), "parsed ufcstats event list");
    Ok(events)
}

#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub fights: Vec<cagecard_core::Fight>,
}

pub fn parse_event_page(
    html: &str,
    order: CardOrder,
    registry: Option<&FighterRegistry>,
) -> Result<EventPage, AdapterError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let name = match select_first_text(root, "span.b-content__title-highlight")? {
        Some(name) => Some(name),
        None => select_first_text(root, "h2.b-content__title")?,
    };

    let mut page = EventPage {
        name,
        ..EventPage::default()
    };

    let detail_sel = selector("li.b-list__box-list-item")?;
    for item in root.select(&detail_sel) {
        let text = node_text(item);
        if let Some(rest) = text.strip_prefix("Date:") {
            page.date = parse_date(rest);
        } else if let Some(rest) = text.strip_prefix("Location:") {
            page.location = text_or_none(rest.to_string());
        }
    }

    let drafts = match first_matching(root, &FIGHT_ROWS)? {
        Some((_, rows)) => {
            let mut drafts = Vec::new();
            for row in rows {
                match parse_fight_row(row)? {
                    FightRow::Bout(draft) => drafts.push(draft),
                    FightRow::Header => {}
                    FightRow::Malformed => {
                        warn_skipped(SourceTag::UfcStats, "fight row", &node_text(row))
                    }
                }
            }
            drafts
        }
        None => Vec::new(),
    };
    page.fights = assemble_card(drafts, order, registry);
    Ok(page)
}

enum FightRow {
    Bout(BoutDraft),
    Header,
    Malformed,
}

fn paragraph_texts(cell: ElementRef<'_>) -> Result<Vec<String>, AdapterError> {
    let p_sel = selector("p")?;
    let texts: Vec<String> = cell
        .select(&p_sel)
        .filter_map(|p| text_or_none(node_text(p)))
        .collect();
    if texts.is_empty() {
        Ok(text_or_none(node_text(cell)).into_iter().collect())
    } else {
        Ok(texts)
    }
}

fn parse_fight_row(row: ElementRef<'_>) -> Result<FightRow, AdapterError> {
    let td_sel = selector("td")?;
    let link_sel = selector("a")?;
    let belt_sel = selector(r#"img[src*="belt"]"#)?;

    let cells: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
    if cells.is_empty() {
        return Ok(FightRow::Header);
    }
    if cells.len() < 8 {
        return Ok(FightRow::Malformed);
    }

    let mut names: Vec<String> = cells[1]
        .select(&link_sel)
        .filter_map(|a| text_or_none(node_text(a)))
        .collect();
    if names.len() < 2 {
        names = paragraph_texts(cells[1])?;
    }
    let [fighter1, fighter2, ..] = names.as_slice() else {
        return Ok(FightRow::Malformed);
    };

    let flag = node_text(cells[0]).to_lowercase();
    let outcome = if flag.contains("win") {
        Outcome::Fighter1Won
    } else if flag.contains("draw") || flag.contains("nc") {
        Outcome::NoWinner
    } else {
        Outcome::Pending
    };

    let weight_class = text_or_none(node_text(cells[6])).unwrap_or_else(|| "Unknown".to_string());
    let belt = cells[6].select(&belt_sel).next().is_some();
    let method = paragraph_texts(cells[7])?.into_iter().next();

    Ok(FightRow::Bout(BoutDraft {
        fighter1: Corner::named(fighter1.as_str()),
        fighter2: Corner::named(fighter2.as_str()),
        title: belt.then(|| title_from_weight_class(&format!("{weight_class} title"))),
        weight_class,
        outcome,
        method,
        round: cells.get(8).and_then(|c| text_or_none(node_text(*c))),
        time: cells.get(9).and_then(|c| text_or_none(node_text(*c))),
        ..BoutDraft::default()
    }))
}

#[cfg(test)]
mod tests {
    use cagecard_core::TitleFight;

    use super::*;

    #[test]
    fn fight_rows_read_flags_belts_and_methods() {
        let html = r#"<table><tbody>
          <tr class="b-fight-details__table-row b-fight-details__table-row__hover">
            <td><p><a><i>win</i></a></p></td>
            <td><p><a href="/fighter-details/1">Alex Pereira</a></p><p><a href="/fighter-details/2">Jamahal Hill</a></p></td>
            <td>1 0</td><td>12 5</td><td>0 0</td><td>0 0</td>
            <td><p>Light Heavyweight <img src="http://1e49bc5171d173577ecd-1323f4090557a33db01577564f60846c.r80.cf1.rackcdn.com/belt.png"></p></td>
            <td><p>KO/TKO</p><p>Punch</p></td>
            <td><p>1</p></td><td><p>3:14</p></td>
          </tr>
          <tr class="b-fight-details__table-row b-fight-details__table-row__hover">
            <td><p>nc</p></td>
            <td><p><a>Jiri Prochazka</a></p><p><a>Aleksandar Rakic</a></p></td>
            <td></td><td></td><td></td><td></td>
            <td><p>Light Heavyweight</p></td><td><p>Overturned</p></td><td>2</td><td>3:17</td>
          </tr>
        </tbody></table>"#;
        let page = parse_event_page(html, CardOrder::MainEventFirst, None).unwrap();
        assert_eq!(page.fights.len(), 2);

        let main = &page.fights[0];
        assert_eq!(main.title_fight, TitleFight::Undisputed);
        assert_eq!(main.winner.as_deref(), Some("Alex Pereira"));
        assert_eq!(main.method.as_deref(), Some("KO/TKO"));
        assert_eq!(main.round, Some(1));

        assert_eq!(page.fights[1].winner, None);
        assert_eq!(page.fights[1].title_fight, TitleFight::None);
    }
}
