//! Fighter identity registry: built once per run, read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use cagecard_core::{Fighter, FighterRecord, SourceTag};
use cagecard_storage::{write_atomic, PageFetcher};
use scraper::Html;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

use crate::text::{champion_marker, clean_fighter_name};
use crate::{node_text, selector, text_or_none, AdapterError};

pub const DEFAULT_FIGHTER_SIMILARITY: f64 = 0.85;
pub const FIGHTERS_LIST_PATH: &str = "/wiki/List_of_current_UFC_fighters";

const WEIGHT_CLASSES: [&str; 12] = [
    "Women's Strawweight",
    "Women's Flyweight",
    "Women's Bantamweight",
    "Women's Featherweight",
    "Light Heavyweight",
    "Heavyweight",
    "Middleweight",
    "Welterweight",
    "Lightweight",
    "Featherweight",
    "Bantamweight",
    "Flyweight",
];

/// Lower-cased, trimmed, whitespace-collapsed.
fn exact_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Letters and digits only: "Jean-Silva" and "Jean Silva" collapse to "jeansilva".
fn normalized_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Name tokens split on whitespace, hyphens and commas, with other punctuation dropped.
fn name_tokens(name: &str) -> Vec<String> {
    name.split(|c: char| c.is_whitespace() || c == '-' || c == ',')
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn first_last(name: &str) -> Option<(String, String)> {
    let tokens = name_tokens(name);
    match tokens.as_slice() {
        [] | [_] => None,
        [first, .., last] => Some((first.clone(), last.clone())),
    }
}

fn unordered(pair: &(String, String)) -> (String, String) {
    if pair.0 <= pair.1 {
        pair.clone()
    } else {
        (pair.1.clone(), pair.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FighterRegistry {
    fighters: HashMap<String, Fighter>,
    by_normalized: HashMap<String, Vec<String>>,
    by_tokens: HashMap<(String, String), Vec<String>>,
    similarity: f64,
}

impl Default for FighterRegistry {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_FIGHTER_SIMILARITY)
    }
}

impl FighterRegistry {
    /// First entry wins on duplicate names.
    pub fn new(fighters: impl IntoIterator<Item = Fighter>, similarity: f64) -> Self {
        let mut registry = Self {
            fighters: HashMap::new(),
            by_normalized: HashMap::new(),
            by_tokens: HashMap::new(),
            similarity,
        };
        for fighter in fighters {
            let key = exact_key(&fighter.name);
            if key.is_empty() {
                continue;
            }
            if registry.fighters.contains_key(&key) {
                debug!(name = %fighter.name, "duplicate fighter name, keeping first entry");
                continue;
            }
            registry
                .by_normalized
                .entry(normalized_key(&key))
                .or_default()
                .push(key.clone());
            if let Some(pair) = first_last(&key) {
                registry
                    .by_tokens
                    .entry(unordered(&pair))
                    .or_default()
                    .push(key.clone());
            }
            registry.fighters.insert(key, fighter);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.fighters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fighters.is_empty()
    }

    pub fn similarity(&self) -> f64 {
        self.similarity
    }

    fn unique<'a>(&'a self, keys: Option<&'a Vec<String>>) -> Option<&'a Fighter> {
        match keys.map(Vec::as_slice) {
            Some([key]) => self.fighters.get(key),
            Some(keys) if keys.len() > 1 => {
                debug!(candidates = keys.len(), "ambiguous fighter identity");
                None
            }
            _ => None,
        }
    }

    /// Exact, then normalized, then first/last tokens in either order, then a unique fuzzy match.
    pub fn lookup(&self, name: &str) -> Option<&Fighter> {
        let key = exact_key(name);
        if key.is_empty() {
            return None;
        }
        if let Some(fighter) = self.fighters.get(&key) {
            return Some(fighter);
        }
        if let Some(fighter) = self.unique(self.by_normalized.get(&normalized_key(&key))) {
            return Some(fighter);
        }
        if let Some(pair) = first_last(&key) {
            let entries = self.by_tokens.get(&unordered(&pair));
            let matching: Vec<&String> = entries
                .into_iter()
                .flatten()
                .filter(|entry| {
                    first_last(entry).is_some_and(|(first, last)| {
                        (first == pair.0 && last == pair.1) || (first == pair.1 && last == pair.0)
                    })
                })
                .collect();
            if let [entry] = matching.as_slice() {
                return self.fighters.get(*entry);
            }
        }
        self.fuzzy(&key)
    }

    fn fuzzy(&self, key: &str) -> Option<&Fighter> {
        let query = name_tokens(key).join(" ");
        let mut best: Option<(f64, &String)> = None;
        let mut tied = false;

        for entry in self.fighters.keys() {
            let score = jaro_winkler(&query, &name_tokens(entry).join(" "));
            if score < self.similarity {
                continue;
            }
            match best {
                Some((top, _)) if (score - top).abs() < f64::EPSILON => tied = true,
                Some((top, _)) if score < top => {}
                _ => {
                    best = Some((score, entry));
                    tied = false;
                }
            }
        }

        match best {
            Some((score, entry)) if !tied => {
                debug!(query = key, matched = %entry, score, "fuzzy fighter match");
                self.fighters.get(entry)
            }
            Some(_) => {
                debug!(query = key, "fuzzy fighter match is ambiguous");
                None
            }
            None => None,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<FighterRecord> {
        self.lookup(name).and_then(|f| f.record_breakdown)
    }

    pub fn fighters(&self) -> impl Iterator<Item = &Fighter> {
        self.fighters.values()
    }

    pub fn load_snapshot(path: &Path, similarity: f64) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading fighter snapshot {}", path.display()))?;
        let entries: BTreeMap<String, Fighter> = serde_json::from_str(&text)
            .with_context(|| format!("parsing fighter snapshot {}", path.display()))?;
        Ok(Self::new(entries.into_values(), similarity))
    }

    pub async fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let entries: BTreeMap<&str, &Fighter> = self
            .fighters
            .values()
            .map(|fighter| (fighter.name.as_str(), fighter))
            .collect();
        let bytes = serde_json::to_vec_pretty(&entries).context("serializing fighter snapshot")?;
        write_atomic(path, &bytes).await
    }

    /// Scrapes the current-fighters list.
    pub async fn build(
        fetcher: &dyn PageFetcher,
        base_url: &str,
        similarity: f64,
    ) -> Result<Self, AdapterError> {
        let url = format!("{}{FIGHTERS_LIST_PATH}", base_url.trim_end_matches('/'));
        let body = fetcher.fetch(SourceTag::Wikipedia, &url).await?.text();
        let fighters = parse_fighter_list(&body)?;
        info!(fighters = fighters.len(), "built fighter registry");
        Ok(Self::new(fighters, similarity))
    }

    /// Loads the snapshot when present, otherwise scrapes and persists a fresh one.
    pub async fn load_or_build(
        snapshot: &Path,
        refresh: bool,
        fetcher: &dyn PageFetcher,
        base_url: &str,
        similarity: f64,
    ) -> anyhow::Result<Self> {
        if !refresh && snapshot.exists() {
            match Self::load_snapshot(snapshot, similarity) {
                Ok(registry) => {
                    info!(fighters = registry.len(), path = %snapshot.display(), "loaded fighter snapshot");
                    return Ok(registry);
                }
                Err(err) => warn!(error = %err, "fighter snapshot unreadable, rebuilding"),
            }
        }
        let registry = Self::build(fetcher, base_url, similarity).await?;
        registry.save_snapshot(snapshot).await?;
        Ok(registry)
    }
}

fn weight_class_for_heading(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    WEIGHT_CLASSES
        .iter()
        .find(|class| lower.contains(&class.to_lowercase()))
        .copied()
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| headers.iter().position(|h| h == name))
        .or_else(|| {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h.contains(name)))
        })
}

/// Fighters from each division table on the current-fighters page.
pub fn parse_fighter_list(html: &str) -> Result<Vec<Fighter>, AdapterError> {
    let document = Html::parse_document(html);
    let walk = selector("h2, h3, h4, table.wikitable")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;
    let link_sel = selector("a")?;
    let img_sel = selector("img")?;

    let mut fighters = Vec::new();
    let mut division: Option<&'static str> = None;

    for element in document.select(&walk) {
        if element.value().name() != "table" {
            division = weight_class_for_heading(&node_text(element));
            continue;
        }
        let Some(weight_class) = division.take() else {
            continue;
        };

        let mut rows = element.select(&row_sel);
        let Some(header) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header
            .select(&cell_sel)
            .map(|c| node_text(c).to_lowercase())
            .collect();
        let name_col = find_column(&headers, &["name", "fighter"]);
        let record_col = find_column(&headers, &["mma record", "record"]);
        let country_col = find_column(&headers, &["iso", "country", "nationality"]);
        let age_col = find_column(&headers, &["age"]);
        let nickname_col = find_column(&headers, &["nickname"]);
        let Some(name_col) = name_col else {
            warn!(weight_class, "division table has no name column");
            continue;
        };

        let mut parsed = 0;
        for row in rows {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            let Some(name_cell) = cells.get(name_col) else {
                continue;
            };
            let raw_name = name_cell
                .select(&link_sel)
                .next()
                .map(node_text)
                .unwrap_or_else(|| node_text(*name_cell));
            let name = clean_fighter_name(&raw_name);
            if name.is_empty() {
                continue;
            }

            let mut fighter = Fighter::named(name);
            fighter.is_champion = champion_marker(&node_text(*name_cell)).is_some();
            if let Some(cell) = record_col.and_then(|i| cells.get(i)) {
                match node_text(*cell).parse::<FighterRecord>() {
                    Ok(record) if record.total_bouts() == 0 => {
                        debug!(name = %fighter.name, "empty record treated as unknown")
                    }
                    Ok(record) => fighter.set_record(record),
                    Err(err) => debug!(name = %fighter.name, error = %err, "unparsed fighter record"),
                }
            }
            if let Some(cell) = country_col.and_then(|i| cells.get(i)) {
                fighter.country = cell
                    .select(&img_sel)
                    .find_map(|img| img.value().attr("alt"))
                    .map(str::to_string)
                    .and_then(text_or_none)
                    .or_else(|| text_or_none(node_text(*cell)));
            }
            if let Some(cell) = age_col.and_then(|i| cells.get(i)) {
                let digits: String = node_text(*cell)
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(char::is_ascii_digit)
                    .collect();
                fighter.age = digits.parse().ok();
            }
            if let Some(cell) = nickname_col.and_then(|i| cells.get(i)) {
                fighter.nickname = text_or_none(node_text(*cell)).filter(|n| n != "N/A");
            }
            fighters.push(fighter);
            parsed += 1;
        }
        debug!(weight_class, parsed, "parsed division table");
    }
    Ok(fighters)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cagecard_storage::StaticFetcher;
    use tempfile::tempdir;

    use super::*;

    fn with_record(name: &str, record: FighterRecord) -> Fighter {
        let mut fighter = Fighter::named(name);
        fighter.set_record(record);
        fighter
    }

    fn registry() -> FighterRegistry {
        FighterRegistry::new(
            [
                with_record("jones, jon", FighterRecord::new(28, 1, 0, 1)),
                with_record("Jean Silva", FighterRecord::new(16, 2, 0, 0)),
                with_record("Sean O'Malley", FighterRecord::new(18, 2, 0, 1)),
                with_record("Alexander Volkanovski", FighterRecord::new(27, 4, 0, 0)),
                with_record("Alex Perez", FighterRecord::new(25, 9, 0, 0)),
            ],
            DEFAULT_FIGHTER_SIMILARITY,
        )
    }

    #[test]
    fn resolves_reversed_name_by_tokens() {
        let record = registry().resolve("Jon Jones").expect("reversed token match");
        assert_eq!(record.wins, 28);
    }

    #[test]
    fn resolves_exact_and_punctuation_variants() {
        let registry = registry();
        assert_eq!(registry.resolve("  JEAN   SILVA ").map(|r| r.wins), Some(16));
        assert_eq!(registry.resolve("Jean-Silva").map(|r| r.wins), Some(16));
        assert_eq!(registry.resolve("Sean OMalley").map(|r| r.wins), Some(18));
    }

    #[test]
    fn unknown_fighters_are_absent() {
        assert!(registry().resolve("Royce Gracie").is_none());
        assert!(registry().resolve("").is_none());
    }

    #[test]
    fn fuzzy_match_requires_threshold() {
        let registry = registry();
        assert_eq!(registry.resolve("Alexander Volkanovsky").map(|r| r.wins), Some(27));

        let strict = FighterRegistry::new(registry.fighters().cloned(), 0.999);
        assert!(strict.resolve("Alexander Volkanovsky").is_none());
    }

    #[test]
    fn duplicate_names_keep_first_entry() {
        let registry = FighterRegistry::new(
            [
                with_record("Bruno Silva", FighterRecord::new(23, 7, 0, 0)),
                with_record("bruno silva", FighterRecord::new(13, 4, 2, 0)),
            ],
            DEFAULT_FIGHTER_SIMILARITY,
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("Bruno Silva").map(|r| r.wins), Some(23));
    }

    const FIGHTERS_PAGE: &str = r#"<html><body>
      <div class="mw-heading mw-heading3"><h3 id="Heavyweights">Heavyweights (265 lb, 120 kg)</h3></div>
      <table class="wikitable sortable">
        <tr><th>ISO</th><th>Name</th><th>Nickname</th><th>Age</th><th>MMA record</th></tr>
        <tr><td><img alt="England" src="f.png"/></td><td><a href="/wiki/Tom_Aspinall">Tom Aspinall</a> (C)</td><td>Honey Badger</td><td>32</td><td>15–3</td></tr>
        <tr><td>FRA</td><td><a href="/wiki/Ciryl_Gane">Ciryl Gane</a></td><td>-</td><td>35</td><td>13–2 (1 NC)</td></tr>
      </table>
      <h3>Light heavyweights</h3>
      <table class="wikitable">
        <tr><th>ISO</th><th>Name</th><th>Age</th><th>MMA record</th></tr>
        <tr><td>BRA</td><td><a>Alex Pereira</a></td><td>38</td><td>12–3–0</td></tr>
        <tr><td>USA</td><td><a>Debut Prospect</a></td><td>24</td><td>0–0–0</td></tr>
      </table>
      <h2>See also</h2>
      <table class="wikitable"><tr><th>Name</th></tr><tr><td>Not A Fighter</td></tr></table>
    </body></html>"#;

    #[test]
    fn parses_division_tables() {
        let fighters = parse_fighter_list(FIGHTERS_PAGE).unwrap();
        let names: Vec<_> = fighters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Tom Aspinall", "Ciryl Gane", "Alex Pereira", "Debut Prospect"]);

        let aspinall = &fighters[0];
        assert!(aspinall.is_champion);
        assert_eq!(aspinall.country.as_deref(), Some("England"));
        assert_eq!(aspinall.nickname.as_deref(), Some("Honey Badger"));
        assert_eq!(aspinall.age, Some(32));
        assert_eq!(aspinall.record.as_deref(), Some("15-3-0"));

        let gane = &fighters[1];
        assert_eq!(gane.nickname, None);
        assert_eq!(gane.record_breakdown.map(|r| r.no_contests()), Some(1));

        assert_eq!(fighters[3].record, None);
    }

    #[tokio::test]
    async fn load_or_build_persists_and_reuses_snapshot() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("fighter_database.json");
        let fetcher = Arc::new(StaticFetcher::new().with_page(
            format!("https://en.wikipedia.org{FIGHTERS_LIST_PATH}"),
            FIGHTERS_PAGE,
        ));

        let built = FighterRegistry::load_or_build(
            &snapshot,
            false,
            fetcher.as_ref(),
            "https://en.wikipedia.org",
            DEFAULT_FIGHTER_SIMILARITY,
        )
        .await
        .unwrap();
        assert_eq!(built.len(), 4);
        assert!(snapshot.exists());

        let reloaded = FighterRegistry::load_or_build(
            &snapshot,
            false,
            fetcher.as_ref(),
            "https://en.wikipedia.org",
            DEFAULT_FIGHTER_SIMILARITY,
        )
        .await
        .unwrap();
        assert_eq!(reloaded.resolve("Gane Ciryl").map(|r| r.wins), Some(13));
        assert_eq!(fetcher.requested().len(), 1);
    }
}
