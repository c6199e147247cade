//! Scrape pipeline orchestration: discovery, reconciliation, extraction and persistence.

pub mod reconcile;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use cagecard_adapters::fighters::DEFAULT_FIGHTER_SIMILARITY;
use cagecard_adapters::{
    adapter_for_source, wikipedia, AdapterContext, FighterRegistry, SourceAdapter, SourceSettings,
};
use cagecard_core::{CandidateEvent, CanonicalEvent, DiscoveryMode, SourceTag, UfcEvent};
use cagecard_storage::{
    EventStore, HttpClientConfig, HttpFetcher, JsonEventStore, PageFetcher, DEFAULT_USER_AGENT,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use reconcile::{EventReconciler, NearDuplicate, ReconcileOutcome, DEFAULT_EVENT_SIMILARITY};

pub const CRATE_NAME: &str = "cagecard-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("event {0} was not found in any enabled source")]
    EventNotFound(String),
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: SourceTag,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: SourceSettings,
}

/// Sources in priority order. The first enabled entry is the primary source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn builtin() -> Self {
        Self {
            sources: SourceTag::ALL
                .into_iter()
                .map(|source| SourceConfig {
                    source,
                    enabled: true,
                    settings: SourceSettings::for_source(source),
                })
                .collect(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(raw).context("parsing source registry")?;
        let mut seen = HashSet::new();
        for entry in &registry.sources {
            ensure!(
                seen.insert(entry.source),
                "source {} is listed more than once",
                entry.source
            );
        }
        Ok(registry)
    }

    /// Reads `path`, falling back to the built-in registry when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no source registry file, using built-in sources");
            return Ok(Self::builtin());
        }
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("loading {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|entry| entry.enabled)
    }

    pub fn settings_for(&self, source: SourceTag) -> SourceSettings {
        self.sources
            .iter()
            .find(|entry| entry.source == source)
            .map(|entry| entry.settings.clone())
            .unwrap_or_else(|| SourceSettings::for_source(source))
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub rate_limit: f64,
    pub output_dir: PathBuf,
    pub fighter_snapshot: PathBuf,
    pub capture_dir: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub event_similarity: f64,
    pub fighter_similarity: f64,
    pub workspace_root: PathBuf,
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let output_dir = lookup("CAGECARD_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let fighter_snapshot = lookup("CAGECARD_FIGHTER_SNAPSHOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| output_dir.join("fighter_database.json"));
        Self {
            rate_limit: parse_var(&lookup, "CAGECARD_RATE_LIMIT").unwrap_or(2.0),
            fighter_snapshot,
            capture_dir: lookup("CAGECARD_CAPTURE_DIR").map(PathBuf::from),
            user_agent: lookup("CAGECARD_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: parse_var(&lookup, "CAGECARD_HTTP_TIMEOUT_SECS").unwrap_or(30),
            event_similarity: parse_var(&lookup, "CAGECARD_EVENT_SIMILARITY")
                .unwrap_or(DEFAULT_EVENT_SIMILARITY),
            fighter_similarity: parse_var(&lookup, "CAGECARD_FIGHTER_SIMILARITY")
                .unwrap_or(DEFAULT_FIGHTER_SIMILARITY),
            workspace_root: lookup("CAGECARD_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            output_dir,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.1..=5.0).contains(&self.rate_limit),
            "rate limit must be between 0.1 and 5.0 requests per second, got {}",
            self.rate_limit
        );
        ensure!(self.http_timeout_secs > 0, "http timeout must be at least one second");
        for (name, value) in [
            ("event similarity", self.event_similarity),
            ("fighter similarity", self.fighter_similarity),
        ] {
            ensure!(
                value > 0.0 && value <= 1.0,
                "{name} must be in (0, 1], got {value}"
            );
        }
        Ok(())
    }

    pub fn sources_path(&self) -> PathBuf {
        self.workspace_root.join("sources.yaml")
    }

    pub fn events_dir(&self) -> PathBuf {
        self.output_dir.join("events")
    }

    pub fn reports_root(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            requests_per_second: self.rate_limit,
            capture_dir: self.capture_dir.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub mode: DiscoveryMode,
    pub since: Option<NaiveDate>,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Discover,
    Extract,
    NotFound,
    Validate,
    Persist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceTag,
    pub stage: FailureStage,
    pub target: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: DiscoveryMode,
    pub since: Option<NaiveDate>,
    pub event_id: Option<String>,
    pub sources_consulted: Vec<SourceTag>,
    pub candidates: usize,
    pub dropped_duplicates: usize,
    pub review: Vec<NearDuplicate>,
    pub events_stored: Vec<String>,
    pub failures: Vec<SourceFailure>,
    pub reports_dir: String,
}

#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub sources_consulted: Vec<SourceTag>,
    pub reconciled: ReconcileOutcome,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Default)]
struct RunLedger {
    stored: Vec<String>,
    failures: Vec<SourceFailure>,
}

impl RunLedger {
    fn fail(&mut self, source: SourceTag, stage: FailureStage, target: &str, message: String) {
        self.failures.push(SourceFailure {
            source,
            stage,
            target: Some(target.to_string()),
            message,
        });
    }
}

pub struct ScrapePipeline {
    config: ScrapeConfig,
    run_id: Uuid,
    adapters: Vec<Box<dyn SourceAdapter>>,
    store: Arc<dyn EventStore>,
    reconciler: EventReconciler,
}

impl ScrapePipeline {
    /// `adapters` are consulted in the given order; the first is the primary source.
    pub fn new(
        config: ScrapeConfig,
        run_id: Uuid,
        adapters: Vec<Box<dyn SourceAdapter>>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        let reconciler = EventReconciler::new(config.event_similarity);
        Self {
            config,
            run_id,
            adapters,
            store,
            reconciler,
        }
    }

    pub fn from_registry(
        config: ScrapeConfig,
        registry: &SourceRegistry,
        ctx: &AdapterContext,
        store: Arc<dyn EventStore>,
    ) -> Self {
        let adapters = registry
            .enabled()
            .map(|entry| adapter_for_source(entry.source, ctx, &entry.settings))
            .collect();
        Self::new(config, ctx.run_id, adapters, store)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn sources(&self) -> Vec<SourceTag> {
        self.adapters.iter().map(|adapter| adapter.source()).collect()
    }

    fn adapter(&self, source: SourceTag) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.source() == source)
            .map(|adapter| adapter.as_ref())
    }

    /// Queries the primary source, and the remaining sources only when it yields nothing.
    pub async fn discover(&self, mode: DiscoveryMode, since: Option<NaiveDate>) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let Some((primary, fallbacks)) = self.adapters.split_first() else {
            warn!("no sources enabled");
            return outcome;
        };

        let primary_events = self
            .discover_one(primary.as_ref(), mode, since, &mut outcome)
            .await;
        let lists = if primary_events.is_empty() {
            info!(primary = %primary.source(), "primary source returned no events, consulting fallbacks");
            let mut lists = Vec::with_capacity(fallbacks.len());
            for adapter in fallbacks {
                lists.push(self.discover_one(adapter.as_ref(), mode, since, &mut outcome).await);
            }
            lists
        } else {
            vec![primary_events]
        };

        outcome.reconciled = self.reconciler.reconcile(lists);
        info!(
            candidates = outcome.reconciled.candidates,
            events = outcome.reconciled.events.len(),
            dropped = outcome.reconciled.dropped,
            review = outcome.reconciled.review.len(),
            "reconciled discovery results"
        );
        outcome
    }

    async fn discover_one(
        &self,
        adapter: &dyn SourceAdapter,
        mode: DiscoveryMode,
        since: Option<NaiveDate>,
        outcome: &mut DiscoveryOutcome,
    ) -> Vec<CandidateEvent> {
        let source = adapter.source();
        outcome.sources_consulted.push(source);
        match adapter.discover(mode, since).await {
            Ok(candidates) => {
                info!(%source, candidates = candidates.len(), "discovered events");
                candidates
            }
            Err(err) => {
                warn!(%source, error = %err, "discovery failed, treating as empty");
                outcome.failures.push(SourceFailure {
                    source,
                    stage: FailureStage::Discover,
                    target: None,
                    message: err.to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Tries each source in priority order until one returns the event.
    pub async fn scrape_event(&self, event_id: &str) -> Result<UfcEvent, SyncError> {
        let (_, event) = self.find_event(event_id, &mut RunLedger::default()).await?;
        Ok(event)
    }

    async fn find_event(
        &self,
        event_id: &str,
        ledger: &mut RunLedger,
    ) -> Result<(SourceTag, UfcEvent), SyncError> {
        for adapter in &self.adapters {
            let source = adapter.source();
            match adapter.extract(event_id).await {
                Ok(Some(event)) => {
                    info!(%source, event_id, "event found");
                    return Ok((source, event));
                }
                Ok(None) => {
                    debug!(%source, event_id, "event not in source");
                    ledger.fail(source, FailureStage::NotFound, event_id, "event not in source".to_string());
                }
                Err(err) => {
                    warn!(%source, event_id, error = %err, "extraction failed, trying next source");
                    ledger.fail(source, FailureStage::Extract, event_id, err.to_string());
                }
            }
        }
        Err(SyncError::EventNotFound(event_id.to_string()))
    }

    async fn extract_canonical(&self, canonical: &CanonicalEvent, ledger: &mut RunLedger) {
        let candidate = &canonical.candidate;
        let Some(adapter) = self.adapter(candidate.source) else {
            warn!(source = %candidate.source, "no adapter for candidate source");
            return;
        };
        match adapter.extract(&candidate.id).await {
            Ok(Some(mut event)) => {
                for (source, url) in &canonical.source_urls {
                    event.source_urls.entry(*source).or_insert_with(|| url.clone());
                }
                self.persist(candidate.source, event, ledger).await;
            }
            Ok(None) => {
                warn!(source = %candidate.source, event_id = %candidate.id, "event page not found");
                ledger.fail(
                    candidate.source,
                    FailureStage::NotFound,
                    &candidate.id,
                    "event page not found".to_string(),
                );
            }
            Err(err) => {
                warn!(source = %candidate.source, event_id = %candidate.id, error = %err, "extraction failed");
                ledger.fail(candidate.source, FailureStage::Extract, &candidate.id, err.to_string());
            }
        }
    }

    async fn persist(&self, source: SourceTag, event: UfcEvent, ledger: &mut RunLedger) {
        if let Err(err) = event.validate() {
            warn!(%source, event_id = %event.event_id, error = %err, "dropping invalid event");
            ledger.fail(source, FailureStage::Validate, &event.event_id, err.to_string());
            return;
        }
        match self.store.upsert(&event).await {
            Ok(_) => {
                info!(%source, event_id = %event.event_id, fights = event.fights.len(), "stored event");
                ledger.stored.push(event.event_id);
            }
            Err(err) => {
                warn!(%source, event_id = %event.event_id, error = %err, "storing event failed");
                ledger.fail(source, FailureStage::Persist, &event.event_id, format!("{err:#}"));
            }
        }
    }

    pub async fn run_once(&self, request: &ScrapeRequest) -> Result<ScrapeRunSummary> {
        let started_at = Utc::now();
        let mut ledger = RunLedger::default();
        let mut discovery = DiscoveryOutcome::default();
        let mut not_found = None;

        match &request.event_id {
            Some(event_id) => {
                discovery.sources_consulted = self.sources();
                match self.find_event(event_id, &mut ledger).await {
                    Ok((source, event)) => self.persist(source, event, &mut ledger).await,
                    Err(err) => {
                        warn!(event_id, "event not found in any source");
                        not_found = Some(err);
                    }
                }
            }
            None => {
                discovery = self.discover(request.mode, request.since).await;
                for canonical in &discovery.reconciled.events {
                    self.extract_canonical(canonical, &mut ledger).await;
                }
            }
        }

        let mut failures = discovery.failures;
        failures.append(&mut ledger.failures);
        let summary = ScrapeRunSummary {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            mode: request.mode,
            since: request.since,
            event_id: request.event_id.clone(),
            sources_consulted: discovery.sources_consulted,
            candidates: discovery.reconciled.candidates,
            dropped_duplicates: discovery.reconciled.dropped,
            review: discovery.reconciled.review,
            events_stored: ledger.stored,
            failures,
            reports_dir: self.reports_dir().display().to_string(),
        };
        self.write_reports(&summary).await?;
        if let Some(err) = not_found {
            return Err(err.into());
        }
        Ok(summary)
    }

    fn reports_dir(&self) -> PathBuf {
        self.config.reports_root().join(self.run_id.to_string())
    }

    async fn write_reports(&self, summary: &ScrapeRunSummary) -> Result<PathBuf> {
        let reports_dir = self.reports_dir();
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let bytes = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
        fs::write(reports_dir.join("summary.json"), bytes)
            .await
            .context("writing summary.json")?;

        fs::write(reports_dir.join("brief.md"), render_brief(summary))
            .await
            .context("writing brief.md")?;

        Ok(reports_dir)
    }
}

fn bullet_list<T>(items: &[T], render: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items.iter().map(|item| format!("- {}", render(item))).collect::<Vec<_>>().join("\n")
}

pub fn render_brief(summary: &ScrapeRunSummary) -> String {
    let scope = match &summary.event_id {
        Some(event_id) => format!("single event `{event_id}`"),
        None => match summary.since {
            Some(since) => format!("{} since {since}", summary.mode.as_str()),
            None => summary.mode.as_str().to_string(),
        },
    };
    format!(
        "# Cagecard Scrape Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Scope: {}\n- Sources consulted: {}\n- Candidates: {}\n- Dropped duplicates: {}\n- Events stored: {}\n\n## Events\n{}\n\n## Review\n{}\n\n## Failures\n{}\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        scope,
        summary
            .sources_consulted
            .iter()
            .map(SourceTag::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        summary.candidates,
        summary.dropped_duplicates,
        summary.events_stored.len(),
        bullet_list(&summary.events_stored, |event_id| event_id.clone()),
        bullet_list(&summary.review, |item| format!(
            "{}: {} ({}) ~ {} ({}) {:.2}",
            item.date, item.event_a, item.source_a, item.event_b, item.source_b, item.confidence_score
        )),
        bullet_list(&summary.failures, |failure| format!(
            "{} {:?} {}: {}",
            failure.source,
            failure.stage,
            failure.target.as_deref().unwrap_or("-"),
            failure.message
        )),
    )
}

pub fn http_fetcher(config: &ScrapeConfig) -> Result<HttpFetcher> {
    HttpFetcher::new(config.http_client_config()).context("building http client")
}

/// Loads the fighter snapshot, scraping the fighter list when it is missing or `refresh` is set.
pub async fn load_fighters(
    config: &ScrapeConfig,
    registry: &SourceRegistry,
    fetcher: &dyn PageFetcher,
    refresh: bool,
) -> Result<FighterRegistry> {
    let settings = registry.settings_for(SourceTag::Wikipedia);
    FighterRegistry::load_or_build(
        &config.fighter_snapshot,
        refresh,
        fetcher,
        settings.base_url_or(wikipedia::DEFAULT_BASE_URL),
        config.fighter_similarity,
    )
    .await
}

/// Wires the live HTTP fetcher, fighter registry and JSON event store from `config`.
pub async fn pipeline_from_config(config: ScrapeConfig) -> Result<ScrapePipeline> {
    config.validate()?;
    let registry = SourceRegistry::load(&config.sources_path()).await?;
    let fetcher: Arc<dyn PageFetcher> = Arc::new(http_fetcher(&config)?);

    let mut ctx = AdapterContext::new(fetcher.clone(), Utc::now().date_naive());
    match load_fighters(&config, &registry, fetcher.as_ref(), false).await {
        Ok(fighters) => {
            info!(fighters = fighters.len(), "fighter registry ready");
            ctx = ctx.with_fighters(Arc::new(fighters));
        }
        Err(err) => warn!(error = ?err, "continuing without fighter registry"),
    }

    let store: Arc<dyn EventStore> = Arc::new(JsonEventStore::new(config.events_dir()));
    Ok(ScrapePipeline::from_registry(config, &registry, &ctx, store))
}

pub async fn run_scrape_from_env(request: &ScrapeRequest) -> Result<ScrapeRunSummary> {
    let pipeline = pipeline_from_config(ScrapeConfig::from_env()).await?;
    pipeline.run_once(request).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cagecard_core::CardOrder;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    #[test]
    fn config_defaults_are_valid() {
        let config = ScrapeConfig::from_lookup(lookup(&[]));
        assert_eq!(config.rate_limit, 2.0);
        assert_eq!(config.output_dir, PathBuf::from("data"));
        assert_eq!(config.fighter_snapshot, PathBuf::from("data/fighter_database.json"));
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.event_similarity, 0.80);
        assert_eq!(config.fighter_similarity, 0.85);
        assert!(config.capture_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_reads_overrides_and_ignores_garbage() {
        let config = ScrapeConfig::from_lookup(lookup(&[
            ("CAGECARD_RATE_LIMIT", "0.5"),
            ("CAGECARD_OUTPUT_DIR", "/tmp/cards"),
            ("CAGECARD_HTTP_TIMEOUT_SECS", "soon"),
            ("CAGECARD_CAPTURE_DIR", "/tmp/raw"),
        ]));
        assert_eq!(config.rate_limit, 0.5);
        assert_eq!(config.fighter_snapshot, PathBuf::from("/tmp/cards/fighter_database.json"));
        assert_eq!(config.events_dir(), PathBuf::from("/tmp/cards/events"));
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.http_client_config().capture_dir, Some(PathBuf::from("/tmp/raw")));
    }

    #[test]
    fn config_validation_rejects_out_of_range_values() {
        let too_fast = ScrapeConfig::from_lookup(lookup(&[("CAGECARD_RATE_LIMIT", "10")]));
        assert!(too_fast.validate().is_err());

        let no_timeout = ScrapeConfig::from_lookup(lookup(&[("CAGECARD_HTTP_TIMEOUT_SECS", "0")]));
        assert!(no_timeout.validate().is_err());

        let loose = ScrapeConfig::from_lookup(lookup(&[("CAGECARD_EVENT_SIMILARITY", "1.5")]));
        assert!(loose.validate().is_err());
    }

    #[test]
    fn registry_yaml_keeps_priority_and_settings() {
        let registry = SourceRegistry::from_yaml_str(
            r#"
sources:
  - source: ufc_official
    card_order: main_event_first
  - source: wikipedia
    enabled: false
    base_url: http://localhost:8080
"#,
        )
        .unwrap();
        let enabled: Vec<_> = registry.enabled().map(|entry| entry.source).collect();
        assert_eq!(enabled, [SourceTag::UfcOfficial]);
        assert_eq!(
            registry.settings_for(SourceTag::UfcOfficial).card_order,
            CardOrder::MainEventFirst
        );
        let wiki = registry.settings_for(SourceTag::Wikipedia);
        assert_eq!(wiki.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(wiki.card_order, CardOrder::MainEventLast);
    }

    #[test]
    fn registry_rejects_duplicate_sources() {
        let err = SourceRegistry::from_yaml_str(
            "sources:\n  - source: wikipedia\n  - source: wikipedia\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[tokio::test]
    async fn workspace_registry_lists_every_source() {
        let registry = SourceRegistry::load(&workspace_root().join("sources.yaml"))
            .await
            .unwrap();
        let sources: Vec<_> = registry.sources.iter().map(|entry| entry.source).collect();
        assert_eq!(sources, SourceTag::ALL);
        assert_eq!(
            registry.settings_for(SourceTag::EspnMma).card_order,
            CardOrder::MainEventLast
        );
    }

    #[tokio::test]
    async fn missing_registry_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::load(&dir.path().join("sources.yaml"))
            .await
            .unwrap();
        assert_eq!(registry, SourceRegistry::builtin());
        assert_eq!(registry.enabled().count(), 4);
        assert_eq!(
            registry.settings_for(SourceTag::Wikipedia).card_order,
            CardOrder::MainEventFirst
        );
        assert_eq!(
            registry.settings_for(SourceTag::UfcOfficial).card_order,
            CardOrder::MainEventFirst
        );
        assert_eq!(
            registry.settings_for(SourceTag::EspnMma).card_order,
            CardOrder::MainEventLast
        );
    }

    #[test]
    fn builtin_registry_matches_shipped_sources_file() {
        let shipped = concat!(env!("CARGO_MANIFEST_DIR"), "/../../sources.yaml");
        let raw = std::fs::read_to_string(shipped).unwrap();
        let registry = SourceRegistry::from_yaml_str(&raw).unwrap();
        for source in SourceTag::ALL {
            assert_eq!(
                registry.settings_for(source).card_order,
                SourceRegistry::builtin().settings_for(source).card_order,
                "{source}"
            );
        }
    }
}
