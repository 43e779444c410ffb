//! Fetching source URLs and normalising them to plain text.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::errors::{KnowledgeError, KnowledgeResult};

const USER_AGENT: &str = concat!("assist-knowledge/", env!("CARGO_PKG_VERSION"));
const TEXT_WIDTH: usize = 100;

/// A fetched source ready to be chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub content: String,
}

pub fn build_client(timeout: Duration) -> KnowledgeResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| KnowledgeError::SourceFetch(format!("reqwest client: {}", e)))
}

pub async fn fetch_page(client: &reqwest::Client, url: &Url) -> KnowledgeResult<FetchedPage> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| KnowledgeError::SourceFetch(format!("HTTP fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(KnowledgeError::SourceFetch(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response
        .text()
        .await
        .map_err(|e| KnowledgeError::SourceFetch(format!("read body {}: {}", url, e)))?;

    debug!(url = %url, content_type = %content_type, bytes = body.len(), "fetched source");
    page_from_body(url, &content_type, &body)
}

/// Convert a response body into a [`FetchedPage`] based on its content type.
pub fn page_from_body(url: &Url, content_type: &str, body: &str) -> KnowledgeResult<FetchedPage> {
    let kind = content_type.to_ascii_lowercase();
    let is_html = kind.contains("text/html")
        || kind.contains("application/xhtml")
        || (kind.is_empty() && looks_like_html(body));
    let is_text = kind.is_empty()
        || kind.starts_with("text/")
        || kind.contains("markdown")
        || kind.contains("application/json");

    if !is_html && !is_text {
        return Err(KnowledgeError::SourceFetch(format!(
            "unsupported content-type '{}' for {}",
            content_type, url
        )));
    }

    let (title, content) = if is_html {
        let title = html_title(body);
        (title, html2text::from_read(body.as_bytes(), TEXT_WIDTH))
    } else {
        (markdown_title(body), body.to_string())
    };

    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(KnowledgeError::SourceFetch(format!("empty document at {}", url)));
    }

    Ok(FetchedPage {
        url: url.to_string(),
        title: title.unwrap_or_else(|| fallback_title(url)),
        content,
    })
}

fn looks_like_html(body: &str) -> bool {
    let lower: String = body.trim_start().chars().take(64).collect::<String>().to_ascii_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html")
}

fn html_title(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn markdown_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
}

fn fallback_title(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
