use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::normalize::normalize;

const DEFAULT_DESCRIPTION: &str = "Stay updated with the latest WhatsApp news and features!";
const DESCRIPTION_CHARS: usize = 150;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// A media reference attached to a feed entry (media:content or enclosure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub content_type: Option<String>,
}

impl MediaRef {
    /// Untyped references are given the benefit of the doubt.
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.starts_with("image"))
    }
}

/// One raw item from the news feed. Absent fields are `None`, never probed for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub media: Vec<MediaRef>,
    pub content_html: Option<String>,
    pub summary_html: Option<String>,
}

impl FeedEntry {
    /// Short plain-text description taken from the entry summary.
    pub fn description(&self) -> String {
        let Some(summary) = self.summary_html.as_deref() else {
            return DEFAULT_DESCRIPTION.to_string();
        };
        let text = normalize(HTML_TAG.replace_all(summary, "").trim());
        if text.chars().count() > DESCRIPTION_CHARS {
            let cut: String = text.chars().take(DESCRIPTION_CHARS - 3).collect();
            format!("{}...", cut)
        } else {
            text
        }
    }
}

impl From<Entry> for FeedEntry {
    fn from(entry: Entry) -> Self {
        let media = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|c| {
                Some(MediaRef {
                    url: c.url.as_ref()?.to_string(),
                    content_type: c.content_type.as_ref().map(|ct| ct.to_string()),
                })
            })
            .collect();

        FeedEntry {
            id: entry.id,
            title: entry.title.map(|t| t.content),
            link: entry.links.first().map(|l| l.href.clone()),
            published: entry.published.or(entry.updated),
            tags: entry.categories.into_iter().map(|c| c.term).collect(),
            media,
            content_html: entry.content.and_then(|c| c.body),
            summary_html: entry.summary.map(|s| s.content),
        }
    }
}

/// Fetches a feed from the given URL and parses it.
/// Retries transient failures (network errors, 5xx, 429) with exponential backoff.
pub async fn fetch_and_parse_feed(client: &Client, url: &str) -> Result<Feed> {
    let max_retries = 3;
    let mut last_error = None;

    for attempt in 1..=max_retries {
        if attempt > 1 {
            let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s, 4s...
            info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, max_retries, backoff);
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.context("failed to read response body")?;
                    let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                    return Ok(feed);
                } else if status.is_server_error() {
                    last_error = Some(anyhow::anyhow!("server error: {}", status));
                    continue;
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(anyhow::anyhow!("rate limited: {}", status));
                    continue;
                } else {
                    // Client error (4xx) - likely permanent, don't retry
                    return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                }
            }
            Err(e) => {
                last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

/// Where raw entries come from
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Newest entries first. Never fails; a broken fetch yields an empty list.
    async fn fetch_latest(&self) -> Vec<FeedEntry>;
}

pub struct HttpFeedSource {
    url: String,
    limit: usize,
    client: Client,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, limit: usize, timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            url: url.into(),
            limit,
            client,
        })
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_latest(&self) -> Vec<FeedEntry> {
        match fetch_and_parse_feed(&self.client, &self.url).await {
            Ok(feed) => {
                info!("Fetched feed '{}': {} items", self.url, feed.entries.len());
                feed.entries
                    .into_iter()
                    .take(self.limit)
                    .map(FeedEntry::from)
                    .collect()
            }
            Err(e) => {
                warn!("failed to fetch feed {}: {:#}", self.url, e);
                Vec::new()
            }
        }
    }
}
