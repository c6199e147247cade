//! Source adapters, fight-card extraction and fighter identity resolution.

use std::sync::Arc;

use async_trait::async_trait;
use cagecard_core::{CandidateEvent, CardOrder, DiscoveryMode, SourceTag, UfcEvent};
use cagecard_storage::{FetchError, PageFetcher};
use chrono::NaiveDate;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub mod espn;
pub mod fight_card;
pub mod fighters;
pub mod strategy;
pub mod text;
pub mod ufc_official;
pub mod ufcstats;
pub mod wikipedia;

pub use fight_card::{assemble_card, assign_bout_order, BoutDraft, CardRow, CardState, Corner, Outcome};
pub use fighters::FighterRegistry;
pub use strategy::SelectorStrategy;

pub const CRATE_NAME: &str = "cagecard-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Per-source knobs read from the source registry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub card_order: CardOrder,
}

impl SourceSettings {
    /// Defaults matching how each source lays out its cards.
    pub fn for_source(source: SourceTag) -> Self {
        let card_order = match source {
            SourceTag::Wikipedia | SourceTag::UfcStats | SourceTag::UfcOfficial => {
                CardOrder::MainEventFirst
            }
            SourceTag::EspnMma => CardOrder::MainEventLast,
        };
        Self {
            base_url: None,
            card_order,
        }
    }

    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(default)
    }
}

/// Run-scoped collaborators shared by every adapter.
#[derive(Clone)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub today: NaiveDate,
    pub fetcher: Arc<dyn PageFetcher>,
    pub fighters: Option<Arc<FighterRegistry>>,
}

impl AdapterContext {
    pub fn new(fetcher: Arc<dyn PageFetcher>, today: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            today,
            fetcher,
            fighters: None,
        }
    }

    pub fn with_fighters(mut self, registry: Arc<FighterRegistry>) -> Self {
        self.fighters = Some(registry);
        self
    }

    pub fn registry(&self) -> Option<&FighterRegistry> {
        self.fighters.as_deref()
    }

    /// Fetches a page body, mapping 404 to `None`.
    pub async fn fetch_text(
        &self,
        source: SourceTag,
        url: &str,
    ) -> Result<Option<String>, AdapterError> {
        match self.fetcher.fetch(source, url).await {
            Ok(response) => Ok(Some(response.text())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceTag;

    /// Candidate events admitted by `mode` and `since`. Malformed list entries are skipped.
    async fn discover(
        &self,
        mode: DiscoveryMode,
        since: Option<NaiveDate>,
    ) -> Result<Vec<CandidateEvent>, AdapterError>;

    /// Full event for a source-specific id, or `None` when the source has no such event.
    async fn extract(&self, event_id: &str) -> Result<Option<UfcEvent>, AdapterError>;
}

pub fn adapter_for_source(
    source: SourceTag,
    ctx: &AdapterContext,
    settings: &SourceSettings,
) -> Box<dyn SourceAdapter> {
    match source {
        SourceTag::Wikipedia => Box::new(wikipedia::WikipediaAdapter::new(ctx.clone(), settings)),
        SourceTag::UfcStats => Box::new(ufcstats::UfcStatsAdapter::new(ctx.clone(), settings)),
        SourceTag::UfcOfficial => {
            Box::new(ufc_official::UfcOfficialAdapter::new(ctx.clone(), settings))
        }
        SourceTag::EspnMma => Box::new(espn::EspnAdapter::new(ctx.clone(), settings)),
    }
}

pub(crate) fn filter_candidates(
    source: SourceTag,
    candidates: Vec<CandidateEvent>,
    mode: DiscoveryMode,
    since: Option<NaiveDate>,
    today: NaiveDate,
) -> Vec<CandidateEvent> {
    let total = candidates.len();
    let kept: Vec<_> = candidates
        .into_iter()
        .filter(|c| mode.admits(c.date, today, since))
        .collect();
    tracing::info!(source = %source, total, kept = kept.len(), mode = mode.as_str(), "discovered events");
    kept
}

pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Whitespace-collapsed text content.
pub(crate) fn node_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "--" || trimmed == "-" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn select_first_text(
    scope: ElementRef<'_>,
    css: &str,
) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).find_map(|n| text_or_none(node_text(n))))
}

pub(crate) fn select_first_attr(
    scope: ElementRef<'_>,
    css: &str,
    attr: &str,
) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope
        .select(&sel)
        .find_map(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string())))
}

pub(crate) fn last_path_segment(href: &str) -> String {
    href.split(['?', '#'])
        .next()
        .unwrap_or(href)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

pub(crate) fn warn_skipped(source: SourceTag, what: &str, fragment: &str) {
    let fragment: String = fragment.chars().take(120).collect();
    warn!(source = %source, fragment, "skipping malformed {what}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_ignore_queries_and_trailing_slashes() {
        assert_eq!(last_path_segment("/wiki/UFC_300"), "UFC_300");
        assert_eq!(
            last_path_segment("http://ufcstats.com/event-details/8ad022dd81224f61/?x=1"),
            "8ad022dd81224f61"
        );
        assert_eq!(last_path_segment("https://www.ufc.com/event/ufc-300#main"), "ufc-300");
    }

    #[test]
    fn relative_links_are_joined_to_base() {
        assert_eq!(
            absolute_url("https://en.wikipedia.org", "/wiki/UFC_300"),
            "https://en.wikipedia.org/wiki/UFC_300"
        );
        assert_eq!(absolute_url("https://x.test/", "https://y.test/a"), "https://y.test/a");
        assert_eq!(absolute_url("https://x.test", "//cdn.test/a"), "https://cdn.test/a");
    }

    #[test]
    fn settings_prefer_configured_base_url() {
        let settings = SourceSettings {
            base_url: Some("http://127.0.0.1:9000/".into()),
            card_order: CardOrder::MainEventFirst,
        };
        assert_eq!(settings.base_url_or("https://en.wikipedia.org"), "http://127.0.0.1:9000");
        assert_eq!(
            SourceSettings::default().base_url_or("https://en.wikipedia.org"),
            "https://en.wikipedia.org"
        );
    }

    #[test]
    fn source_defaults_follow_page_layout() {
        assert_eq!(
            SourceSettings::for_source(SourceTag::Wikipedia).card_order,
            CardOrder::MainEventFirst
        );
        assert_eq!(
            SourceSettings::for_source(SourceTag::UfcStats).card_order,
            CardOrder::MainEventFirst
        );
        assert_eq!(
            SourceSettings::for_source(SourceTag::UfcOfficial).card_order,
            CardOrder::MainEventFirst
        );
        assert_eq!(
            SourceSettings::for_source(SourceTag::EspnMma).card_order,
            CardOrder::MainEventLast
        );
        assert_eq!(SourceSettings::for_source(SourceTag::EspnMma).base_url, None);
    }
}
