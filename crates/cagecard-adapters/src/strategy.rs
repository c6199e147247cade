//! Ordered selector fallbacks. Markup drifts, so every lookup that depends on a
//! site's class names goes through a list of strategies tried in order.

use scraper::ElementRef;
use tracing::debug;

use crate::{selector, AdapterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorStrategy {
    pub name: &'static str,
    pub css: &'static str,
    pub min_matches: usize,
}

impl SelectorStrategy {
    pub const fn new(name: &'static str, css: &'static str) -> Self {
        Self {
            name,
            css,
            min_matches: 1,
        }
    }

    pub const fn at_least(mut self, min_matches: usize) -> Self {
        self.min_matches = min_matches;
        self
    }
}

/// Elements of the first strategy yielding at least `min_matches` hits.
pub fn first_matching<'a>(
    scope: ElementRef<'a>,
    strategies: &[SelectorStrategy],
) -> Result<Option<(SelectorStrategy, Vec<ElementRef<'a>>)>, AdapterError> {
    for strategy in strategies {
        let sel = selector(strategy.css)?;
        let found: Vec<ElementRef<'a>> = scope.select(&sel).collect();
        if found.len() >= strategy.min_matches.max(1) {
            debug!(strategy = strategy.name, matches = found.len(), "selector strategy matched");
            return Ok(Some((*strategy, found)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    const STRATEGIES: [SelectorStrategy; 3] = [
        SelectorStrategy::new("rows", "tr.event-row").at_least(2),
        SelectorStrategy::new("cards", "div.card"),
        SelectorStrategy::new("links", "a"),
    ];

    #[test]
    fn falls_through_until_minimum_is_met() {
        let doc = Html::parse_document(
            r#"<table><tr class="event-row"><td>only one</td></tr></table>
               <div class="card">A</div><div class="card">B</div><a href="/x">x</a>"#,
        );
        let (strategy, found) = first_matching(doc.root_element(), &STRATEGIES)
            .unwrap()
            .expect("a strategy matches");
        assert_eq!(strategy.name, "cards");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn reports_none_when_nothing_matches() {
        let doc = Html::parse_document("<p>nothing here</p>");
        assert!(first_matching(doc.root_element(), &STRATEGIES).unwrap().is_none());
    }

    #[test]
    fn invalid_css_is_an_error() {
        let doc = Html::parse_document("<p></p>");
        let bad = [SelectorStrategy::new("broken", "div[")];
        assert!(matches!(
            first_matching(doc.root_element(), &bad),
            Err(AdapterError::Selector { .. })
        ));
    }
}
