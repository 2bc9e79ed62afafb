//! Change-detecting access to the static GTFS input.
//!
//! A [`Resource`] is a fetchable input that can cheaply answer "did the
//! upstream change since I last fetched it?". The loop supervisor only
//! re-loads the static feed when the answer is yes, and at most once per
//! configured check period.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;

use crate::error::Result;
use crate::fetch::{self, BasicClient, HttpClient};

/// How long a whole-archive download may take.
const FETCH_TIMEOUT: Duration = Duration::from_secs(600);

#[async_trait]
pub trait Resource: Send {
    /// Returns true when the upstream changed since the last [`fetch`](Self::fetch).
    ///
    /// Performs no I/O while less than the configured period has elapsed
    /// since the previous completed check; in that case the answer is false.
    async fn check(&mut self) -> Result<bool>;

    /// Retrieves the resource body and records its modification metadata.
    async fn fetch(&mut self) -> Result<Vec<u8>>;
}

/// Wraps a CLI `--gtfs-file` value: URLs become an [`HttpResource`],
/// anything else a [`LocalResource`].
pub fn for_source(source: &str, period: Duration) -> Box<dyn Resource> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpResource::new(
            BasicClient::with_request_timeout(FETCH_TIMEOUT),
            source.to_string(),
            period,
        ))
    } else {
        Box::new(LocalResource::new(PathBuf::from(source), period))
    }
}

/// A resource on the local file system, compared by modification time.
pub struct LocalResource {
    path: PathBuf,
    period: Duration,
    checked_at: Option<Instant>,
    fetched_modified: Option<SystemTime>,
}

impl LocalResource {
    pub fn new(path: PathBuf, period: Duration) -> Self {
        Self {
            path,
            period,
            checked_at: None,
            fetched_modified: None,
        }
    }
}

fn within_period(checked_at: Option<Instant>, period: Duration) -> bool {
    checked_at.is_some_and(|at| at.elapsed() < period)
}

#[async_trait]
impl Resource for LocalResource {
    async fn check(&mut self) -> Result<bool> {
        if within_period(self.checked_at, self.period) {
            return Ok(false);
        }

        let modified = tokio::fs::metadata(&self.path).await?.modified()?;
        let changed = match self.fetched_modified {
            Some(fetched) => modified > fetched,
            None => true,
        };

        self.checked_at = Some(Instant::now());
        Ok(changed)
    }

    async fn fetch(&mut self) -> Result<Vec<u8>> {
        let data = tokio::fs::read(&self.path).await?;
        self.fetched_modified = Some(tokio::fs::metadata(&self.path).await?.modified()?);
        Ok(data)
    }
}

/// A resource on the internet, compared by ETag when both sides have one
/// and by `Last-Modified` otherwise.
pub struct HttpResource<C> {
    client: C,
    url: String,
    period: Duration,
    checked_at: Option<Instant>,
    fetched_etag: Option<String>,
    fetched_modified: Option<DateTime<Utc>>,
}

impl<C> HttpResource<C> {
    pub fn new(client: C, url: String, period: Duration) -> Self {
        Self {
            client,
            url,
            period,
            checked_at: None,
            fetched_etag: None,
            fetched_modified: None,
        }
    }
}

#[async_trait]
impl<C: HttpClient + Send + Sync> Resource for HttpResource<C> {
    async fn check(&mut self) -> Result<bool> {
        if within_period(self.checked_at, self.period) {
            return Ok(false);
        }

        let resp = fetch::head_checked(&self.client, &self.url).await?;
        let remote_etag = header(&resp, "etag");
        let remote_modified = header(&resp, "last-modified").and_then(|lm| parse_last_modified(&lm));

        let changed = match (&self.fetched_etag, &remote_etag) {
            (Some(local), Some(remote)) => local != remote,
            _ => match remote_modified {
                Some(remote) => self.fetched_modified.is_none_or(|local| remote > local),
                // No usable metadata on the remote side; assume changed.
                None => true,
            },
        };
        debug!("checked {}: changed={}", self.url, changed);

        self.checked_at = Some(Instant::now());
        Ok(changed)
    }

    async fn fetch(&mut self) -> Result<Vec<u8>> {
        let resp = fetch::get_checked(&self.client, &self.url).await?;
        self.fetched_etag = header(&resp, "etag");
        self.fetched_modified =
            header(&resp, "last-modified").and_then(|lm| parse_last_modified(&lm));
        Ok(resp.bytes().await?.to_vec())
    }
}

fn header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parses a `Last-Modified` value. RFC 2822 parsing accepts both the
/// RFC 1123 (`... GMT`) and RFC 1123Z (`... +0000`) date forms; the result
/// is compared in UTC.
fn parse_last_modified(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
