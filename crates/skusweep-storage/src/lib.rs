//! Checkpoint file persistence + HTTP trigger utilities for skusweep.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use skusweep_core::{Classification, DeleteCategory};
use thiserror::Error;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};

pub use reqwest::StatusCode;

pub const CRATE_NAME: &str = "skusweep-storage";

const EXECUTION_DIR: [&str; 3] = ["files", "execution", "skuList"];
const DELETE_DIR: [&str; 3] = ["files", "deleteDB", "skuList"];
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Result of persisting a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// All three sets were empty; stale pending files were removed and
    /// nothing was exported.
    Empty,
    Written {
        big_ticket: usize,
        soft_line: usize,
        others: usize,
    },
}

/// File-based checkpoint store. Historical files are timestamp-suffixed and
/// never overwritten; pending (`_Delete`) files are fully replaced each run
/// and are the sole input contract to the deletion phase.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn execution_dir(&self, subdir: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in EXECUTION_DIR {
            path.push(part);
        }
        path.join(subdir)
    }

    fn history_path(&self, subdir: &str, prefix: &str, stamp: &str) -> PathBuf {
        self.execution_dir(subdir)
            .join(format!("{prefix}_List_{stamp}.txt"))
    }

    pub fn pending_path(&self, category: DeleteCategory) -> PathBuf {
        let mut path = self.root.clone();
        for part in DELETE_DIR {
            path.push(part);
        }
        path.join(category.dir_name())
            .join(format!("{}_List_Delete.txt", category.list_prefix()))
    }

    /// Persist the classification: history files for every non-empty set,
    /// pending files for big-ticket and soft-line only. Prior pending files
    /// are always removed first so a set that became empty leaves no stale
    /// delete list behind.
    pub async fn persist(
        &self,
        stamp: DateTime<Utc>,
        classification: &Classification,
    ) -> anyhow::Result<PersistOutcome> {
        if classification.is_empty() {
            info!("no skus to export; clearing stale pending files");
            self.clear_pending().await?;
            return Ok(PersistOutcome::Empty);
        }

        self.clear_pending().await?;

        let ts = stamp.format(TIMESTAMP_FORMAT).to_string();

        if !classification.big_ticket.is_empty() {
            let history = self.history_path("BT", "BigTicket", &ts);
            write_sku_lines(&history, &classification.big_ticket).await?;
            let pending = self.pending_path(DeleteCategory::BigTicket);
            write_sku_lines(&pending, &classification.big_ticket).await?;
            info!(
                count = classification.big_ticket.len(),
                path = %pending.display(),
                "exported big-ticket sku list"
            );
        }

        if !classification.soft_line.is_empty() {
            let history = self.history_path("SL", "SoftLine", &ts);
            write_sku_lines(&history, &classification.soft_line).await?;
            let pending = self.pending_path(DeleteCategory::SoftLine);
            write_sku_lines(&pending, &classification.soft_line).await?;
            info!(
                count = classification.soft_line.len(),
                path = %pending.display(),
                "exported soft-line sku list"
            );
        }

        if !classification.others.is_empty() {
            // History only: others are excluded from destructive action.
            let history = self.history_path("Others", "Others", &ts);
            write_sku_lines(&history, &classification.others).await?;
            info!(count = classification.others.len(), "exported others sku list");
        }

        Ok(PersistOutcome::Written {
            big_ticket: classification.big_ticket.len(),
            soft_line: classification.soft_line.len(),
            others: classification.others.len(),
        })
    }

    /// Remove both pending files if present. Missing files are not errors.
    pub async fn clear_pending(&self) -> anyhow::Result<()> {
        for category in [DeleteCategory::BigTicket, DeleteCategory::SoftLine] {
            let path = self.pending_path(category);
            match fs::remove_file(&path).await {
                Ok(()) => info!(path = %path.display(), "removed prior pending file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("removing pending file {}", path.display()));
                }
            }
        }
        Ok(())
    }

    /// Read the pending list for a category. `None` when the file is absent;
    /// blank lines and surrounding whitespace are dropped.
    pub async fn read_pending(
        &self,
        category: DeleteCategory,
    ) -> anyhow::Result<Option<Vec<String>>> {
        let path = self.pending_path(category);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading pending file {}", path.display()));
            }
        };
        let skus = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        Ok(Some(skus))
    }
}

/// One identifier per line, UTF-8, newline-terminated, no header.
async fn write_sku_lines(path: &Path, skus: &[String]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating checkpoint directory {}", parent.display()))?;
    }
    let mut body = String::with_capacity(skus.iter().map(|s| s.len() + 1).sum());
    for sku in skus {
        body.push_str(sku);
        body.push('\n');
    }
    fs::write(path, body)
        .await
        .with_context(|| format!("writing checkpoint file {}", path.display()))
}

/// Basic-auth credentials supplied in a reversible base64 encoding. The
/// encoding is configuration hygiene, not a security boundary.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn from_encoded(username: &str, password: &str) -> anyhow::Result<Self> {
        Ok(Self {
            username: decode_credential(username)?,
            password: decode_credential(password)?,
        })
    }
}

fn decode_credential(value: &str) -> anyhow::Result<String> {
    let bytes = BASE64
        .decode(value.trim())
        .context("decoding base64 credential")?;
    String::from_utf8(bytes).context("decoded credential is not valid UTF-8")
}

pub fn encode_credential(value: &str) -> String {
    BASE64.encode(value.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct TriggerClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for TriggerClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Terminal response from the trigger endpoint. Non-success statuses are
/// reported here rather than as errors; only transport failures surface as
/// [`TriggerError`].
#[derive(Debug, Clone)]
pub struct TriggerResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TriggerResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
}

/// Seam between the notifier and the HTTP stack, so callers can be tested
/// without a live endpoint.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn post(&self, url: &str) -> Result<TriggerResponse, TriggerError>;
}

/// reqwest-backed trigger client issuing authenticated POSTs with capped
/// exponential backoff on retryable failures.
#[derive(Debug)]
pub struct TriggerClient {
    client: reqwest::Client,
    credentials: BasicCredentials,
    backoff: BackoffPolicy,
}

impl TriggerClient {
    pub fn new(config: TriggerClientConfig, credentials: BasicCredentials) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            credentials,
            backoff: config.backoff,
        })
    }

    async fn post_once(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
    }
}

#[async_trait]
impl Trigger for TriggerClient {
    async fn post(&self, url: &str) -> Result<TriggerResponse, TriggerError> {
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let span = info_span!("trigger_post", url, attempt);
            match self.post_once(url).instrument(span).await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success()
                        && classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(%status, attempt, "retryable trigger status; backing off");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    let body = resp.text().await?;
                    return Ok(TriggerResponse { status, body });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(TriggerError::Request(err));
                }
            }
        }

        Err(TriggerError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}
