use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use scraper::{Html, Selector};

use crate::config::NoteConfig;

const DEFAULT_MAX_BYTES: usize = 1_000_000;

/// Best-effort article data pulled from a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub html: String,
    pub authors: Vec<String>,
    pub publish_date: Option<String>,
}

/// External content-fetcher collaborator. Failures never surface as errors
/// the pipeline must handle: any fetch or parse problem yields `None` and the
/// note keeps its current title/body.
pub trait ContentFetcher {
    fn fetch_title(&self, url: &str) -> Option<String>;
    fn fetch_article(&self, url: &str) -> Option<Article>;
}

pub struct HttpFetcher {
    client: Client,
    user_agent: String,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: String, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build content fetcher HTTP client")?;
        Ok(Self {
            client,
            user_agent,
            max_bytes: DEFAULT_MAX_BYTES,
        })
    }

    pub fn from_config(config: &NoteConfig) -> Result<Self> {
        Self::new(config.user_agent(), config.timeout_ms())
    }

    fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent.clone())
            .header("Accept", "text/html, text/plain;q=0.9,*/*;q=0.1")
            .send()
            .with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} while fetching {}", status.as_u16(), url);
        }
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("text/html") {
            bail!("unsupported content-type: {content_type}");
        }
        let mut text = response.text().context("failed to read response body")?;
        truncate_to_byte_budget(&mut text, self.max_bytes);
        Ok(text)
    }
}

/// Truncate to at most `max_bytes`, backing off to the previous char
/// boundary.
fn truncate_to_byte_budget(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

impl ContentFetcher for HttpFetcher {
    fn fetch_title(&self, url: &str) -> Option<String> {
        let html = self.fetch_html(url).ok()?;
        parse_title(&html)
    }

    fn fetch_article(&self, url: &str) -> Option<Article> {
        let html = self.fetch_html(url).ok()?;
        parse_article(&html)
    }
}

/// Page title: `<title>` text first, `og:title` as fallback.
pub fn parse_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").ok()?;
    if let Some(title) = document.select(&title_selector).next() {
        let text = title.text().collect::<String>();
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }

    let og_selector = Selector::parse("meta[property=\"og:title\"]").ok()?;
    document
        .select(&og_selector)
        .find_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(ToString::to_string)
}

/// Main content plus metadata. The body heuristic is intentionally shallow:
/// `<article>`, then `<main>`, then `<body>`.
pub fn parse_article(html: &str) -> Option<Article> {
    let document = Html::parse_document(html);
    let title = parse_title(html)?;

    let body_html = ["article", "main", "body"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let inner = element.inner_html();
        if inner.trim().is_empty() {
            None
        } else {
            Some(inner)
        }
    })?;

    let mut authors = Vec::new();
    for selector_text in ["meta[name=\"author\"]", "meta[property=\"article:author\"]"] {
        let Ok(selector) = Selector::parse(selector_text) else {
            continue;
        };
        for meta in document.select(&selector) {
            if let Some(content) = meta.value().attr("content") {
                let content = content.trim();
                if !content.is_empty() && !authors.iter().any(|known| known == content) {
                    authors.push(content.to_string());
                }
            }
        }
    }

    let publish_date = Selector::parse("meta[property=\"article:published_time\"]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .find_map(|meta| meta.value().attr("content"))
                .map(|content| {
                    // Date part only; the attribute value is a full timestamp.
                    // Non-ASCII values have no 10-byte boundary and are kept
                    // whole.
                    let trimmed = content.trim();
                    trimmed.get(..10).unwrap_or(trimmed).to_string()
                })
                .filter(|date| !date.is_empty())
        });

    Some(Article {
        title,
        html: body_html,
        authors,
        publish_date,
    })
}
