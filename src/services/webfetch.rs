//! Web fetch pipeline
//!
//! Fetches a URL with browser-like headers, bounds the response size,
//! converts HTML to text or markdown on request, and extracts page metadata
//! (title, preview image, description) from HTML responses.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::utils::{AppError, AppResult};

/// Wrap width for plain-text conversion
const TEXT_WIDTH: usize = 80;

const ACCEPT_HEADER: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_HEADER: &str = "en-US,en;q=0.9";

/// Requested output format for fetched content
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Html,
    Text,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Text => "text",
            OutputFormat::Markdown => "markdown",
        }
    }
}

/// Decoded webfetch payload
///
/// Fields are read leniently: a missing or wrongly-typed field falls back to
/// its default instead of failing the whole payload.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub format: Option<String>,
    pub timeout: Option<f64>,
}

impl FetchRequest {
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        Self {
            url: payload
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            format: payload
                .get("format")
                .and_then(|v| v.as_str())
                .map(String::from),
            timeout: payload.get("timeout").and_then(|v| v.as_f64()),
        }
    }
}

/// Non-fatal problem attached to an otherwise successful fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchWarning {
    pub code: String,
    pub message: String,
    pub details: String,
}

impl FetchWarning {
    fn conversion(details: String) -> Self {
        Self {
            code: "conversion_warning".to_string(),
            message: "Content conversion failed; returning the original body".to_string(),
            details,
        }
    }
}

/// Metadata describing the fetched page
#[derive(Debug, Clone, Serialize)]
pub struct FetchMetadata {
    pub url: String,
    pub format: String,
    pub content_type: String,
    pub status_code: u16,
    pub content_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Successful fetch envelope
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub success: bool,
    pub output: String,
    pub metadata: FetchMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<FetchWarning>,
}

/// Fetches web pages on behalf of authenticated callers
#[derive(Clone)]
pub struct WebFetchService {
    client: Client,
    config: FetchConfig,
}

impl WebFetchService {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.default_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    /// Run the fetch pipeline for one request.
    ///
    /// Upstream HTTP error statuses are not treated as failures; the status
    /// code is recorded in the metadata and the body is returned as-is.
    pub async fn fetch(&self, request: &FetchRequest) -> AppResult<FetchResult> {
        if request.url.is_empty() {
            return Err(AppError::validation_with_details(
                "missing_url",
                "The 'url' field is required in the payload",
                json!({
                    "field": "url",
                    "message": "The 'url' field is required and cannot be empty",
                }),
            ));
        }

        let parsed = Url::parse(&request.url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| {
                AppError::validation_with_details(
                    "invalid_url",
                    "Invalid URL. It must start with http:// or https://",
                    json!({
                        "url": request.url,
                        "expected": "URL must start with http:// or https://",
                    }),
                )
            })?;

        let format = self.resolve_format(request.format.as_deref())?;
        let timeout_secs = self.resolve_timeout(request.timeout);

        debug!(url = %request.url, format = format.as_str(), timeout_secs, "Fetching URL");

        let response = self
            .client
            .get(parsed.clone())
            .timeout(Duration::from_secs(timeout_secs))
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, ACCEPT_HEADER)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_HEADER)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnreachable(e.to_string()))?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = self.read_bounded_body(response).await?;
        let content_length = body.len();

        debug!(url = %request.url, status_code, content_length, "Upstream response received");

        let is_html =
            content_type.contains("text/html") || content_type.contains("application/xhtml+xml");

        let raw = String::from_utf8_lossy(&body).into_owned();

        let mut metadata = FetchMetadata {
            url: request.url.clone(),
            format: format.as_str().to_string(),
            content_type,
            status_code,
            content_length,
            title: None,
            image: None,
            description: None,
        };

        if is_html {
            extract_html_metadata(&raw, &parsed, &mut metadata);
        }

        let mut warning = None;
        let output = match format {
            OutputFormat::Html => raw,
            OutputFormat::Markdown if is_html => html2md::parse_html(&raw),
            OutputFormat::Text if is_html => match html_to_text(&raw) {
                Ok(text) => text,
                Err(e) => {
                    warning = Some(FetchWarning::conversion(e));
                    raw
                }
            },
            // Non-HTML bodies pass through untouched for every format
            _ => raw,
        };

        Ok(FetchResult {
            success: true,
            output,
            metadata,
            warning,
        })
    }

    fn resolve_format(&self, requested: Option<&str>) -> AppResult<OutputFormat> {
        match requested {
            None | Some("") | Some("html") => Ok(OutputFormat::Html),
            Some("text") => Ok(OutputFormat::Text),
            Some("markdown") => Ok(OutputFormat::Markdown),
            Some(other) => Err(AppError::validation_with_details(
                "invalid_format",
                "Invalid format. Use 'text', 'markdown' or 'html'",
                json!({
                    "format": other,
                    "accepted": ["text", "markdown", "html"],
                }),
            )),
        }
    }

    /// Resolve the effective timeout: default when absent or nonsensical,
    /// silently capped at the configured maximum.
    fn resolve_timeout(&self, requested: Option<f64>) -> u64 {
        match requested {
            Some(t) if t >= 1.0 => (t as u64).min(self.config.max_timeout_secs),
            _ => self.config.default_timeout_secs,
        }
    }

    /// Stream the body into memory, rejecting it outright once it crosses the
    /// size cap. No partial output is ever returned.
    async fn read_bounded_body(&self, response: reqwest::Response) -> AppResult<Vec<u8>> {
        let mut stream = response.bytes_stream();
        let mut body: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::UpstreamRead(e.to_string()))?;

            if body.len() + chunk.len() > self.config.max_response_bytes {
                return Err(AppError::ResponseTooLarge(format!(
                    "Response body exceeded the {} byte limit",
                    self.config.max_response_bytes
                )));
            }

            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

fn html_to_text(html: &str) -> Result<String, String> {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), TEXT_WIDTH).map_err(|e| e.to_string())
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let t = el.text().collect::<Vec<_>>().join(" ");
    let t = t.trim().to_string();
    (!t.is_empty()).then_some(t)
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let v = el.value().attr(attr)?;
    let v = v.trim().to_string();
    (!v.is_empty()).then_some(v)
}

/// Fill in title, preview image and description from an HTML document.
///
/// The image falls back from `og:image` to `twitter:image` to the favicon;
/// only the favicon href is resolved against the page URL, the meta values
/// are taken verbatim.
fn extract_html_metadata(html: &str, base: &Url, metadata: &mut FetchMetadata) {
    let doc = Html::parse_document(html);

    metadata.title = first_text(&doc, "title");

    metadata.image = first_attr(&doc, "meta[property=\"og:image\"]", "content")
        .or_else(|| first_attr(&doc, "meta[name=\"twitter:image\"]", "content"))
        .or_else(|| {
            first_attr(&doc, "link[rel*=\"icon\"]", "href")
                .and_then(|href| base.join(&href).ok())
                .map(|u| u.to_string())
        });

    metadata.description = first_attr(&doc, "meta[property=\"og:description\"]", "content")
        .or_else(|| first_attr(&doc, "meta[name=\"description\"]", "content"));
}
