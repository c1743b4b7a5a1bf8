//! Forecast sources.
//!
//! A [`ForecastSource`] delivers the newest raw forecast. Failures are split
//! into transient ones, which the pipeline retries with backoff, and
//! permanent ones, which end the run immediately.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::raw::RawGrid;

/// Why a fetch failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Worth retrying: network trouble, server errors, data not yet published.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help: bad request, undecodable document.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Delivers the newest raw forecast.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self) -> Result<RawGrid, FetchError>;

    /// Where the data comes from, recorded in version manifests.
    fn describe(&self) -> String;
}

/// Source configuration as it appears in service config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A JSON file, or the newest JSON file in a directory.
    File { path: PathBuf },
    Http(HttpSourceConfig),
}

impl SourceConfig {
    pub fn build(&self) -> Result<Arc<dyn ForecastSource>, FetchError> {
        Ok(match self {
            Self::File { path } => Arc::new(FileSource::new(path)),
            Self::Http(config) => Arc::new(HttpSource::new(config.clone())?),
        })
    }
}

// ============================================================================
// File source
// ============================================================================

/// Reads raw grids from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file to read: the path itself, or the most recently modified
    /// `.json` file directly inside it.
    pub fn resolve(&self) -> Result<PathBuf, FetchError> {
        if !self.path.is_dir() {
            return Ok(self.path.clone());
        }

        WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((modified, e.into_path()))
            })
            .max()
            .map(|(_, path)| path)
            .ok_or_else(|| {
                FetchError::Transient(format!("no .json files in {}", self.path.display()))
            })
    }
}

async fn read_raw_file(path: &Path) -> Result<RawGrid, FetchError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            FetchError::Transient(format!("{} not found", path.display()))
        }
        std::io::ErrorKind::PermissionDenied => {
            FetchError::Permanent(format!("cannot read {}: {}", path.display(), e))
        }
        _ => FetchError::Transient(format!("cannot read {}: {}", path.display(), e)),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FetchError::Permanent(format!("{} is not a raw grid: {}", path.display(), e)))
}

#[async_trait]
impl ForecastSource for FileSource {
    async fn fetch(&self) -> Result<RawGrid, FetchError> {
        let path = self.resolve()?;
        debug!(path = %path.display(), "Reading raw forecast");
        read_raw_file(&path).await
    }

    fn describe(&self) -> String {
        self.resolve()
            .unwrap_or_else(|_| self.path.clone())
            .display()
            .to_string()
    }
}

// ============================================================================
// HTTP source
// ============================================================================

/// Configuration of an [`HttpSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// URL with `{date}` (YYYYMMDD) and `{run}` (HH) placeholders
    pub url_template: String,
    /// Forecast cycles in UTC hours
    #[serde(default = "default_cycles")]
    pub cycles: Vec<u32>,
    /// Hours after a cycle before its data is published
    #[serde(default = "default_publication_lag_hours")]
    pub publication_lag_hours: u32,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_cycles() -> Vec<u32> {
    vec![0, 6, 12, 18]
}

fn default_publication_lag_hours() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl HttpSourceConfig {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            cycles: default_cycles(),
            publication_lag_hours: default_publication_lag_hours(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Most recent forecast cycle published at `now`.
///
/// Looks at `now - lag` and picks the latest cycle hour not after it, falling
/// back to the previous day's last cycle.
pub fn latest_cycle(now: DateTime<Utc>, cycles: &[u32], lag_hours: u32) -> DateTime<Utc> {
    let available = now - ChronoDuration::hours(lag_hours as i64);
    let date = available.date_naive();
    let hour = available.hour();

    let mut sorted: Vec<u32> = cycles.iter().copied().filter(|&c| c < 24).collect();
    sorted.sort_unstable();

    let (date, cycle) = match sorted.iter().rev().find(|&&c| c <= hour) {
        Some(&c) => (date, c),
        None => (
            date.pred_opt().unwrap_or(date),
            sorted.last().copied().unwrap_or(0),
        ),
    };
    let time = NaiveTime::from_hms_opt(cycle, 0, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}

/// Fill `{date}` and `{run}` for a cycle.
pub fn resolve_template(template: &str, cycle: DateTime<Utc>) -> String {
    template
        .replace("{date}", &cycle.format("%Y%m%d").to_string())
        .replace("{run}", &format!("{:02}", cycle.hour()))
}

/// Fetches raw grids over HTTP.
pub struct HttpSource {
    client: Client,
    config: HttpSourceConfig,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("wave-edr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// URL of the newest published cycle at `now`.
    pub fn resolve_url(&self, now: DateTime<Utc>) -> String {
        let cycle = latest_cycle(now, &self.config.cycles, self.config.publication_lag_hours);
        resolve_template(&self.config.url_template, cycle)
    }
}

fn classify_status(status: StatusCode, url: &str) -> FetchError {
    let msg = format!("GET {} returned {}", url, status);
    if status == StatusCode::NOT_FOUND
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        FetchError::Transient(msg)
    } else {
        FetchError::Permanent(msg)
    }
}

fn classify_reqwest(err: reqwest::Error, url: &str) -> FetchError {
    if err.is_builder() || err.is_decode() {
        FetchError::Permanent(format!("GET {}: {}", url, err))
    } else {
        FetchError::Transient(format!("GET {}: {}", url, err))
    }
}

#[async_trait]
impl ForecastSource for HttpSource {
    async fn fetch(&self) -> Result<RawGrid, FetchError> {
        let url = self.resolve_url(Utc::now());
        info!(url = %url, "Fetching raw forecast");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_reqwest(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, &url));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest(e, &url))?;
        debug!(url = %url, bytes = body.len(), "Downloaded raw forecast");

        serde_json::from_slice(&body)
            .map_err(|e| FetchError::Permanent(format!("{} is not a raw grid: {}", url, e)))
    }

    fn describe(&self) -> String {
        self.resolve_url(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_latest_cycle_same_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 13, 30, 0).unwrap();
        // 13:30 - 5h = 08:30 -> 06Z
        assert_eq!(
            latest_cycle(now, &[0, 6, 12, 18], 5),
            Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_latest_cycle_previous_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        // 03:00 - 5h = Feb 29 22:00 -> 18Z on Feb 29
        assert_eq!(
            latest_cycle(now, &[0, 6, 12, 18], 5),
            Utc.with_ymd_and_hms(2024, 2, 29, 18, 0, 0).unwrap()
        );

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
        // Only a 12Z cycle: falls back to yesterday's
        assert_eq!(
            latest_cycle(now, &[12], 0),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resolve_template() {
        let cycle = Utc.with_ymd_and_hms(2024, 1, 5, 6, 0, 0).unwrap();
        assert_eq!(
            resolve_template("https://host/gfswave/{date}/wave_{run}z.json", cycle),
            "https://host/gfswave/20240105/wave_06z.json"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "u").is_transient());
        assert!(classify_status(StatusCode::NOT_FOUND, "u").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "u").is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN, "u").is_transient());
    }

    #[test]
    fn test_source_config_yaml_shape() {
        let config: SourceConfig = serde_json::from_value(serde_json::json!({
            "kind": "http",
            "url_template": "https://host/{date}/{run}.json"
        }))
        .unwrap();
        match config {
            SourceConfig::Http(http) => {
                assert_eq!(http.cycles, vec![0, 6, 12, 18]);
                assert_eq!(http.publication_lag_hours, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_source_picks_newest_json() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("a.json");
        std::fs::write(&old, "{}").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let new = dir.path().join("b.json");
        std::fs::write(
            &new,
            r#"{"dims": ["time", "lat", "lon"], "coords": {}, "variables": {}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = FileSource::new(dir.path());
        assert_eq!(source.resolve().unwrap(), new);
        let raw = source.fetch().await.unwrap();
        assert_eq!(raw.dims.len(), 3);
    }

    #[tokio::test]
    async fn test_file_source_errors() {
        let dir = tempfile::tempdir().unwrap();

        let empty = FileSource::new(dir.path());
        assert!(empty.fetch().await.unwrap_err().is_transient());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();
        let err = FileSource::new(&bad).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Permanent(_)));
    }
}
