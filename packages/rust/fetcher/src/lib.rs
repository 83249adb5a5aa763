//! Content fetching for record references.
//!
//! A reference names where a record's fresh content originates: an absolute
//! filesystem path, a bare URL, or a `"<url>,<selector>"` pair. The fetcher
//! resolves the reference into a byte payload, applying the staleness checks
//! that let up-to-date records skip expensive downloads and reconversion.
//!
//! No retries at this layer: a transport failure surfaces immediately and
//! the pipeline decides whether the batch continues.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use refsync_shared::{RefsyncError, Result, kinds};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("refsync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Outcome of resolving a reference.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The source has not changed since the record's baseline, or its
    /// content-type is not one the converter handles. Expected, not an error.
    Skip { reason: String },
    /// Fresh content to classify and convert.
    Payload {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Resolves references into content payloads.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with a configured HTTP client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RefsyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Resolve `reference` into content, honoring the staleness baseline.
    ///
    /// Branch priority: existing filesystem path, `URL,selector` pair,
    /// bare URL, then "source not found".
    pub async fn fetch(
        &self,
        reference: &str,
        current_text: &str,
        baseline: DateTime<Utc>,
    ) -> Result<FetchOutcome> {
        let path = Path::new(reference);
        if path.exists() {
            return fetch_file(path, current_text, baseline);
        }

        if reference.contains(',') && is_http(reference) {
            // split on the first comma only
            let (raw_url, selector) = reference
                .split_once(',')
                .unwrap_or((reference, ""));
            return self.fetch_selector(raw_url.trim(), selector.trim()).await;
        }

        if is_http(reference) {
            return self.fetch_url(reference, current_text, baseline).await;
        }

        Err(RefsyncError::NotFound {
            reference: reference.to_string(),
        })
    }

    /// `URL,selector` branch: retrieve the page and extract the first
    /// element matching the CSS selector.
    async fn fetch_selector(&self, raw_url: &str, selector: &str) -> Result<FetchOutcome> {
        let url = parse_url(raw_url)?;
        debug!(%url, selector, "fetching URL+selector reference");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| RefsyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefsyncError::Network(format!("{url}: HTTP {status}")));
        }

        let content_type = header_content_type(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| RefsyncError::Network(format!("{url}: body read failed: {e}")))?;

        let parsed = Selector::parse(selector)
            .map_err(|e| RefsyncError::parse(format!("invalid selector '{selector}': {e}")))?;

        let doc = Html::parse_document(&body);
        let element = doc.select(&parsed).next().ok_or_else(|| {
            RefsyncError::parse(format!("no element matched selector '{selector}' at {url}"))
        })?;

        let text = element.text().collect::<String>();
        debug!(%url, len = text.len(), "selector extraction succeeded");

        Ok(FetchOutcome::Payload {
            bytes: text.into_bytes(),
            content_type,
        })
    }

    /// Bare-URL branch: probe with HEAD for staleness and content-type
    /// acceptance before downloading the body.
    async fn fetch_url(
        &self,
        raw_url: &str,
        current_text: &str,
        baseline: DateTime<Utc>,
    ) -> Result<FetchOutcome> {
        let url = parse_url(raw_url)?;
        debug!(%url, "probing bare URL reference");

        let head = self
            .client
            .head(url.as_str())
            .send()
            .await
            .map_err(|e| RefsyncError::Network(format!("{url}: {e}")))?;

        // Staleness is only checked when prior text exists and the server
        // reports a modification time.
        if !current_text.is_empty() {
            let last_modified = head
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok());

            if let Some(last_modified) = last_modified {
                let remote = DateTime::parse_from_rfc2822(last_modified)
                    .map_err(|e| {
                        RefsyncError::parse(format!(
                            "invalid Last-Modified '{last_modified}': {e}"
                        ))
                    })?
                    .with_timezone(&Utc);

                if remote <= baseline {
                    let reason = format!(
                        "source is up to date (remote modified {remote}, record updated {baseline})"
                    );
                    debug!(%url, %reason, "skipping bare URL");
                    return Ok(FetchOutcome::Skip { reason });
                }
            }
        }

        let head_type = header_content_type(head.headers());
        if !head_type
            .as_deref()
            .is_some_and(kinds::is_known_content_type)
        {
            // Expected for pages linking to miscellaneous assets
            let reason = format!(
                "unsupported content type: {}",
                head_type.as_deref().unwrap_or("<none>")
            );
            debug!(%url, %reason, "skipping bare URL");
            return Ok(FetchOutcome::Skip { reason });
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| RefsyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefsyncError::Network(format!("{url}: HTTP {status}")));
        }

        let content_type = header_content_type(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RefsyncError::Network(format!("{url}: body read failed: {e}")))?
            .to_vec();

        debug!(%url, len = bytes.len(), "bare URL retrieved");
        Ok(FetchOutcome::Payload {
            bytes,
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Local file branch
// ---------------------------------------------------------------------------

/// Read a local file, skipping when the record already holds text newer
/// than the file.
fn fetch_file(path: &Path, current_text: &str, baseline: DateTime<Utc>) -> Result<FetchOutcome> {
    let metadata = std::fs::metadata(path).map_err(|e| RefsyncError::io(path, e))?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map_err(|e| RefsyncError::io(path, e))?
        .into();

    if !current_text.is_empty() && modified <= baseline {
        let reason =
            format!("source is up to date (file modified {modified}, record updated {baseline})");
        debug!(path = %path.display(), %reason, "skipping local file");
        return Ok(FetchOutcome::Skip { reason });
    }

    let bytes = std::fs::read(path).map_err(|e| RefsyncError::io(path, e))?;
    let content_type = content_type_for_path(path);
    debug!(path = %path.display(), len = bytes.len(), content_type, "local file read");

    Ok(FetchOutcome::Payload {
        bytes,
        content_type: Some(content_type.to_string()),
    })
}

/// Claimed content-type derived from a file extension.
fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether a reference names an HTTP(S) resource.
fn is_http(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| RefsyncError::parse(format!("invalid URL '{raw}': {e}")))
}

fn header_content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
