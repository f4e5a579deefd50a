use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::caption::{CaptionFormatter, CAPTION_LIMIT};
use crate::categorize::{categorize, Category};
use crate::ingestion::{FeedEntry, FeedSource};
use crate::llm::summarizer::{summarize_text, DEFAULT_TARGET_WORDS};
use crate::llm::{SummaryOptions, SummaryProvider};
use crate::media::{select_image_url, ImageFetcher};
use crate::normalize::normalize;
use crate::publisher::{MessageHandle, Publisher};
use crate::scraping::ContentExtractor;
use crate::storage::{NewPost, PostStore, SubscriberRegistry};

const DEFAULT_TITLE: &str = "WhatsApp Update";

/// Pause between two processed entries, so outbound publishing stays polite.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub entry_delay: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            entry_delay: Duration::from_secs(2),
        }
    }
}

/// Knobs for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Broadcast target (channel id or @username)
    pub target: String,
    pub caption_limit: usize,
    pub summary: SummaryOptions,
    pub target_words: usize,
    pub rate_limit: RateLimit,
}

impl PipelineSettings {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            caption_limit: CAPTION_LIMIT,
            summary: SummaryOptions::default(),
            target_words: DEFAULT_TARGET_WORDS,
            rate_limit: RateLimit::default(),
        }
    }
}

/// Steps an entry goes through. A failure is reported with the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetched,
    DedupCheck,
    Categorized,
    Enriched,
    Rendered,
    Persisted,
    Published,
    Notified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetched => "fetched",
            Stage::DedupCheck => "dedup-check",
            Stage::Categorized => "categorized",
            Stage::Enriched => "enriched",
            Stage::Rendered => "rendered",
            Stage::Persisted => "persisted",
            Stage::Published => "published",
            Stage::Notified => "notified",
        };
        f.write_str(name)
    }
}

/// Terminal state of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Already known; nothing happened.
    Skipped,
    /// Published and fanned out. `delivered` counts successful notifications.
    Notified {
        handle: MessageHandle,
        category: Category,
        recipients: usize,
        delivered: usize,
    },
    Failed { at: Stage, error: String },
}

impl EntryOutcome {
    fn failed(at: Stage, error: impl fmt::Display) -> Self {
        EntryOutcome::Failed {
            at,
            error: error.to_string(),
        }
    }
}

/// What one tick did, entry by entry, in feed order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(String, EntryOutcome)>,
}

impl RunReport {
    pub fn published(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntryOutcome::Notified { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntryOutcome::Skipped))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntryOutcome::Failed { .. }))
            .count()
    }
}

/// Everything needed to publish an entry, computed before any side effect.
struct RenderedEntry {
    post: NewPost,
    caption: String,
    image_url: Option<String>,
}

/// Turns raw feed entries into published posts.
pub struct Pipeline {
    source: Arc<dyn FeedSource>,
    extractor: ContentExtractor,
    summarizer: Option<Arc<dyn SummaryProvider>>,
    images: ImageFetcher,
    formatter: CaptionFormatter,
    store: Arc<dyn PostStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FeedSource>,
        extractor: ContentExtractor,
        summarizer: Option<Arc<dyn SummaryProvider>>,
        images: ImageFetcher,
        formatter: CaptionFormatter,
        store: Arc<dyn PostStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            extractor,
            summarizer,
            images,
            formatter,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// One polling tick. Entries are handled strictly in feed order and a failing
    /// entry never stops the batch.
    pub async fn run(&self, publisher: &dyn Publisher, registry: &dyn SubscriberRegistry) -> RunReport {
        let entries = self.source.fetch_latest().await;
        let mut report = RunReport::default();
        if entries.is_empty() {
            info!("no entries in feed");
            return report;
        }

        for entry in entries {
            debug!(post_id = %entry.id, stage = %Stage::Fetched, "processing entry");
            let outcome = self.process_entry(&entry, publisher, registry).await;

            match &outcome {
                EntryOutcome::Skipped => debug!(post_id = %entry.id, "already known, skipped"),
                EntryOutcome::Notified { delivered, recipients, .. } => info!(
                    post_id = %entry.id,
                    "published; notified {}/{} subscribers", delivered, recipients
                ),
                EntryOutcome::Failed { at, error } => {
                    error!(post_id = %entry.id, stage = %at, "entry failed: {}", error)
                }
            }

            let processed = !matches!(outcome, EntryOutcome::Skipped);
            report.outcomes.push((entry.id.clone(), outcome));
            if processed && !self.settings.rate_limit.entry_delay.is_zero() {
                tokio::time::sleep(self.settings.rate_limit.entry_delay).await;
            }
        }

        info!(
            "tick done: {} published, {} skipped, {} failed",
            report.published(),
            report.skipped(),
            report.failed()
        );
        report
    }

    async fn process_entry(
        &self,
        entry: &FeedEntry,
        publisher: &dyn Publisher,
        registry: &dyn SubscriberRegistry,
    ) -> EntryOutcome {
        match self.store.exists(&entry.id).await {
            Ok(true) => return EntryOutcome::Skipped,
            Ok(false) => {}
            Err(e) => return EntryOutcome::failed(Stage::DedupCheck, format!("{:#}", e)),
        }

        info!(post_id = %entry.id, "new post found: {}", entry.title.as_deref().unwrap_or(DEFAULT_TITLE));
        let rendered = self.render(entry).await;

        // Recorded before publishing: a crash past this point never double-posts.
        if let Err(e) = self.store.insert(&rendered.post).await {
            return EntryOutcome::failed(Stage::Persisted, format!("{:#}", e));
        }
        debug!(post_id = %entry.id, stage = %Stage::Persisted, "post recorded");

        let Some(image) = self.images.download(rendered.image_url.as_deref()).await else {
            return EntryOutcome::failed(Stage::Published, "no image could be downloaded");
        };

        let handle = match publisher
            .publish(&self.settings.target, &rendered.caption, &image)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return EntryOutcome::failed(Stage::Published, format!("{:#}", e)),
        };
        if let Err(e) = self.store.update_publish_handle(&entry.id, handle.0).await {
            warn!(post_id = %entry.id, "failed to record message handle: {:#}", e);
        }

        let category = rendered.post.category;
        let recipients = match registry.subscribers_for(category).await {
            Ok(recipients) => recipients,
            Err(e) => return EntryOutcome::failed(Stage::Notified, format!("{:#}", e)),
        };

        let text = notification_text(category, &rendered.post.title);
        let mut delivered = 0;
        for recipient in &recipients {
            match publisher.notify(*recipient, &text).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!("notification to {} failed: {:#}", recipient, e),
            }
        }

        EntryOutcome::Notified {
            handle,
            category,
            recipients: recipients.len(),
            delivered,
        }
    }

    /// Categorize, enrich and format. Never fails: every network step degrades.
    async fn render(&self, entry: &FeedEntry) -> RenderedEntry {
        let (_, category) = categorize(&entry.tags);
        debug!(post_id = %entry.id, stage = %Stage::Categorized, category = %category);

        let title = normalize(entry.title.as_deref().unwrap_or(DEFAULT_TITLE));
        let link = entry.link.clone().unwrap_or_default();

        let article = if link.is_empty() {
            Default::default()
        } else {
            self.extractor.extract(&link).await
        };

        let text = article.plain_text();
        let body = if text.trim().is_empty() {
            entry.description()
        } else {
            summarize_text(
                self.summarizer.as_deref(),
                &text,
                &self.settings.summary,
                self.settings.target_words,
            )
            .await
        };
        debug!(post_id = %entry.id, stage = %Stage::Enriched, "body: {} chars", body.chars().count());

        let caption = self
            .formatter
            .format(&title, &body, category, self.settings.caption_limit);
        debug!(post_id = %entry.id, stage = %Stage::Rendered, "caption ready");

        RenderedEntry {
            image_url: select_image_url(article.image_url.as_deref(), entry),
            caption,
            post: NewPost {
                id: entry.id.clone(),
                title,
                link,
                published: entry.published,
                category,
            },
        }
    }
}

pub fn notification_text(category: Category, title: &str) -> String {
    format!(
        "🔔 New {} post!\n\n📰 {}\n\n👆 Check the channel for details!",
        category,
        crate::caption::escape_html(title)
    )
}
