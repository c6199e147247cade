//! Page fetching, raw capture and event persistence for cagecard.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use cagecard_core::SourceTag;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

mod events;

pub use events::{EventStore, JsonEventStore, MemoryEventStore};

pub const CRATE_NAME: &str = "cagecard-storage";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Content-addressed store for raw page captures.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn capture_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        source: SourceTag,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let stamp = fetched_at.format("%Y%m%d").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(stamp)
            .join(source.as_str())
            .join(format!("{content_hash}.{ext}"))
    }

    pub async fn store_capture(
        &self,
        fetched_at: DateTime<Utc>,
        source: SourceTag,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.capture_relative_path(fetched_at, source, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);

        let exists = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking capture path {}", absolute_path.display()))?;
        if !exists {
            write_atomic(&absolute_path, bytes).await?;
        }

        Ok(StoredArtifact {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated: exists,
        })
    }
}

/// Writes `bytes` to a temp file beside `path` and renames it into place.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// How a failed request to a source is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Overload, throttling or network trouble. Worth another attempt.
    Transient,
    /// The source has no such page. The caller moves on to the next source.
    Missing,
    /// Any other refusal. Reported as-is.
    Rejected,
}

pub fn classify_status(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        404 | 410 => FailureKind::Missing,
        408 | 429 | 500..=599 => FailureKind::Transient,
        _ => FailureKind::Rejected,
    }
}

pub fn classify_transport_error(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        FailureKind::Transient
    } else {
        FailureKind::Rejected
    }
}

/// Seconds form of `Retry-After`; HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts per URL, including the first.
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    pub fn allows_retry(&self, retries_so_far: usize) -> bool {
        retries_so_far + 1 < self.attempts
    }

    /// Doubles per retry unless the source asked for a specific wait. Never exceeds `max_delay`.
    pub fn delay_before_retry(&self, retries_so_far: usize, requested: Option<Duration>) -> Duration {
        let doubled = || {
            let factor = 1u32.checked_shl(retries_so_far as u32).unwrap_or(u32::MAX);
            self.base_delay.saturating_mul(factor)
        };
        requested.unwrap_or_else(doubled).min(self.max_delay)
    }
}

/// Grants one request slot per interval. The lock is held while sleeping so
/// concurrent callers queue up behind each other.
#[derive(Debug)]
pub struct IntervalLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// `requests_per_second` must be positive; non-positive rates disable limiting.
    pub fn per_second(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 && requests_per_second.is_finite() {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub requests_per_second: f64,
    pub backoff: BackoffPolicy,
    pub capture_dir: Option<PathBuf>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            requests_per_second: 2.0,
            backoff: BackoffPolicy::default(),
            capture_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn ok(final_url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            final_url: final_url.into(),
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|source| FetchError::Decode {
            url: self.final_url.clone(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("page not found: {url}")]
    NotFound { url: String },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Anything that can turn a URL into a response body for a given source.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, source: SourceTag, url: &str) -> Result<FetchedResponse, FetchError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: IntervalLimiter,
    backoff: BackoffPolicy,
    captures: Option<ArtifactStore>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            limiter: IntervalLimiter::per_second(config.requests_per_second),
            backoff: config.backoff,
            captures: config.capture_dir.map(ArtifactStore::new),
        })
    }

    async fn capture(&self, source: SourceTag, url: &str, body: &[u8]) {
        let Some(store) = &self.captures else {
            return;
        };
        let extension = if url.contains("/apis/") || url.ends_with(".json") {
            "json"
        } else {
            "html"
        };
        match store.store_capture(Utc::now(), source, extension, body).await {
            Ok(artifact) => debug!(path = %artifact.relative_path.display(), "captured page"),
            Err(err) => warn!(error = %err, url, "failed to capture page"),
        }
    }

    async fn fetch_with_retries(
        &self,
        source: SourceTag,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let mut retries = 0;
        loop {
            self.limiter.acquire().await;
            let can_retry = self.backoff.allows_retry(retries);

            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        self.capture(source, url, &body).await;
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    match classify_status(status) {
                        FailureKind::Missing => {
                            debug!(%status, "page missing on source");
                            return Err(FetchError::NotFound { url: final_url });
                        }
                        FailureKind::Transient if can_retry => {
                            let wait = self
                                .backoff
                                .delay_before_retry(retries, retry_after(resp.headers()));
                            warn!(%status, retries, wait_ms = wait.as_millis() as u64, "source busy, retrying");
                            tokio::time::sleep(wait).await;
                            retries += 1;
                        }
                        _ => {
                            return Err(FetchError::HttpStatus {
                                status: status.as_u16(),
                                url: final_url,
                            });
                        }
                    }
                }
                Err(err) => {
                    if classify_transport_error(&err) == FailureKind::Transient && can_retry {
                        warn!(error = %err, retries, "retrying after request error");
                        tokio::time::sleep(self.backoff.delay_before_retry(retries, None)).await;
                        retries += 1;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, source: SourceTag, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", source = %source, url);
        self.fetch_with_retries(source, url).instrument(span).await
    }
}

/// Serves canned bodies keyed by URL. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Vec<u8>>,
    requests: StdMutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, _source: SourceTag, url: &str) -> Result<FetchedResponse, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        match self.pages.get(url) {
            Some(body) => Ok(FetchedResponse::ok(url, body.clone())),
            None => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
        }
    }
}
