//! Dry run of the enrichment pipeline: fetch a feed and print the captions
//! that would be published, without touching the database or the channel.

use betafeed::caption::{display_len, truncate_units, CaptionFormatter, CAPTION_LIMIT};
use betafeed::categorize::categorize;
use betafeed::ingestion::{FeedSource, HttpFeedSource};
use betafeed::llm::remote::{RemoteSummarizer, DEFAULT_SUMMARIZER_URL};
use betafeed::llm::summarizer::{summarize_text, DEFAULT_TARGET_WORDS};
use betafeed::llm::{SummaryOptions, SummaryProvider};
use betafeed::media::select_image_url;
use betafeed::normalize::normalize;
use betafeed::scraping::{ContentExtractor, ImagePolicy, BROWSER_USER_AGENT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://wabetainfo.com/feed/".to_string());

    // The remote summarizer is only used when a token is available
    let remote = std::env::var("HF_API_TOKEN")
        .ok()
        .map(|token| RemoteSummarizer::new(DEFAULT_SUMMARIZER_URL, Some(token)));
    let provider = remote.as_ref().map(|r| r as &dyn SummaryProvider);

    let source = HttpFeedSource::new(url.as_str(), 3, 15, BROWSER_USER_AGENT)?;
    let extractor = ContentExtractor::new(30, BROWSER_USER_AGENT, ImagePolicy::default())?;
    let formatter = CaptionFormatter::new("@WABetaNews");

    println!("\n{}", "=".repeat(60));
    println!("Previewing: {}", url);
    println!("Summarizer: {}", if provider.is_some() { "remote + fallback" } else { "extractive only" });
    println!("{}", "=".repeat(60));

    for entry in source.fetch_latest().await {
        let (emoji, category) = categorize(&entry.tags);
        let title = normalize(entry.title.as_deref().unwrap_or("WhatsApp Update"));
        let article = match entry.link.as_deref() {
            Some(link) => extractor.extract(link).await,
            None => Default::default(),
        };

        let text = article.plain_text();
        let body = if text.is_empty() {
            entry.description()
        } else {
            summarize_text(provider, &text, &SummaryOptions::default(), DEFAULT_TARGET_WORDS).await
        };
        let caption = formatter.format(&title, &body, category, CAPTION_LIMIT);

        println!("\n[{}] {} {}", entry.id, emoji, category);
        println!("  Blocks: {}, Image: {:?}", article.blocks.len(), select_image_url(article.image_url.as_deref(), &entry));
        if !article.is_empty() {
            println!("  Extracted:\n{}\n", truncate_units(&article.body(), 600));
        }
        println!("  Caption ({} chars):\n{}", display_len(&caption), caption);
    }

    Ok(())
}
