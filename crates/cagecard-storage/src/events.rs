use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use cagecard_core::{EventSummary, UfcEvent};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{write_atomic, ArtifactStore};

/// Persistence sink for finished events. Upserts are idempotent per `event_id`.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn upsert(&self, event: &UfcEvent) -> anyhow::Result<bool>;
    async fn get(&self, event_id: &str) -> anyhow::Result<Option<UfcEvent>>;
    /// Summaries ordered by event date, newest first.
    async fn list(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<EventSummary>>;
}

fn page(mut summaries: Vec<EventSummary>, limit: usize, offset: usize) -> Vec<EventSummary> {
    summaries.sort_by(|a, b| {
        b.event_date
            .cmp(&a.event_date)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    summaries.into_iter().skip(offset).take(limit).collect()
}

/// One JSON document per event under a directory.
#[derive(Debug, Clone)]
pub struct JsonEventStore {
    root: PathBuf,
}

impl JsonEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name_for(event_id: &str) -> String {
        let mut slug = String::with_capacity(event_id.len());
        for ch in event_id.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        let slug = if slug.is_empty() { "event" } else { slug };
        let hash = ArtifactStore::sha256_hex(event_id.as_bytes());
        format!("{slug}-{}.json", &hash[..8])
    }

    pub fn path_for(&self, event_id: &str) -> PathBuf {
        self.root.join(Self::file_name_for(event_id))
    }

    async fn read_event(path: &Path) -> anyhow::Result<UfcEvent> {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("reading event document {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing event document {}", path.display()))
    }
}

#[async_trait]
impl EventStore for JsonEventStore {
    async fn upsert(&self, event: &UfcEvent) -> anyhow::Result<bool> {
        let path = self.path_for(&event.event_id);
        let bytes = serde_json::to_vec_pretty(event).context("serializing event")?;
        write_atomic(&path, &bytes).await?;
        debug!(event_id = %event.event_id, path = %path.display(), fights = event.fights.len(), "stored event");
        Ok(true)
    }

    async fn get(&self, event_id: &str) -> anyhow::Result<Option<UfcEvent>> {
        let path = self.path_for(event_id);
        if !fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            return Ok(None);
        }
        Self::read_event(&path).await.map(Some)
    }

    async fn list(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<EventSummary>> {
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("listing {}", self.root.display()))?;

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_event(&path).await {
                Ok(event) => summaries.push(event.summary()),
                Err(err) => warn!(error = %err, "skipping unreadable event document"),
            }
        }
        Ok(page(summaries, limit, offset))
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<HashMap<String, UfcEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn upsert(&self, event: &UfcEvent) -> anyhow::Result<bool> {
        self.events
            .lock()
            .await
            .insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    async fn get(&self, event_id: &str) -> anyhow::Result<Option<UfcEvent>> {
        Ok(self.events.lock().await.get(event_id).cloned())
    }

    async fn list(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<EventSummary>> {
        let summaries = self
            .events
            .lock()
            .await
            .values()
            .map(UfcEvent::summary)
            .collect();
        Ok(page(summaries, limit, offset))
    }
}
