use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::caption::escape_html;
use crate::normalize::normalize;

/// Some origins reject default client identities.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main content containers, most specific first.
const CONTAINER_SELECTORS: [&str; 4] = ["div.entry-content", "article", "div.post-content", "main"];
const BLOCK_SELECTOR: &str = "p, h2, h3, h4, li, blockquote";
const MIN_BLOCK_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Subheading,
    ListItem,
    Quote,
}

/// One block-level piece of article text, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ArticleBlock {
    /// Inline rendering in the platform's HTML subset.
    fn render(&self) -> String {
        let text = escape_html(&self.text);
        match self.kind {
            BlockKind::Paragraph => text,
            BlockKind::Subheading => format!("\n\n<b>📌 {}</b>\n", text),
            BlockKind::Quote => format!("\n<i>「{}」</i>\n", text),
            BlockKind::ListItem => format!("• {}", text),
        }
    }
}

/// What we could pull out of an article page. Empty on any failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub blocks: Vec<ArticleBlock>,
    pub image_url: Option<String>,
}

impl ExtractedArticle {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Full rendered body, blocks separated by blank lines.
    pub fn body(&self) -> String {
        self.blocks
            .iter()
            .map(ArticleBlock::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Undecorated text of every block in document order; this is what gets
    /// summarized. Blocks without terminal punctuation (headings, list items)
    /// get a period so they stay separate sentences.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| {
                let text = b.text.trim_end();
                if text.ends_with(['.', '!', '?']) {
                    text.to_string()
                } else {
                    format!("{}.", text)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where article images are expected to live on the source site.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    pub host: String,
    pub path_marker: String,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            host: "wabetainfo.com".to_string(),
            path_marker: "wp-content/uploads".to_string(),
        }
    }
}

/// Fetches article pages and pulls out body text and a representative image.
pub struct ContentExtractor {
    client: Client,
    images: ImagePolicy,
}

impl ContentExtractor {
    pub fn new(timeout_secs: u64, user_agent: &str, images: ImagePolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client, images })
    }

    /// Never fails: network errors, timeouts and non-2xx pages yield an empty article.
    pub async fn extract(&self, url: &str) -> ExtractedArticle {
        match self.fetch_page(url).await {
            Ok(html) => {
                let article = extract_from_html(&html, url, &self.images);
                info!(
                    "scraping: extracted {} blocks from {} (image: {})",
                    article.blocks.len(),
                    url,
                    article.image_url.is_some()
                );
                article
            }
            Err(e) => {
                warn!("scraping: failed to fetch {}: {:#}", url, e);
                ExtractedArticle::default()
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.context("failed to fetch article page")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("article fetch failed with status: {}", status);
        }

        response.text().await.context("failed to read response body")
    }
}

/// Parse a fetched page. Kept synchronous since `Html` is not `Send`.
pub fn extract_from_html(html: &str, page_url: &str, images: &ImagePolicy) -> ExtractedArticle {
    let document = Html::parse_document(html);

    let container = CONTAINER_SELECTORS.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        let found = document.select(&selector).next();
        if found.is_some() {
            debug!("scraping: content container matched '{}'", selector_str);
        }
        found
    });

    let blocks = container.map(collect_blocks).unwrap_or_default();

    let image_url = container
        .and_then(|c| container_image(c, page_url, images))
        .or_else(|| social_preview_image(&document, page_url));

    ExtractedArticle { blocks, image_url }
}

fn collect_blocks(container: ElementRef<'_>) -> Vec<ArticleBlock> {
    let Ok(selector) = Selector::parse(BLOCK_SELECTOR) else {
        return Vec::new();
    };

    container
        .select(&selector)
        .filter_map(|element| {
            let raw = element.text().collect::<String>();
            let text = raw.trim();
            if text.chars().count() < MIN_BLOCK_CHARS {
                return None;
            }
            let kind = match element.value().name() {
                "h2" | "h3" | "h4" => BlockKind::Subheading,
                "blockquote" => BlockKind::Quote,
                "li" => BlockKind::ListItem,
                _ => BlockKind::Paragraph,
            };
            Some(ArticleBlock {
                kind,
                text: normalize(text),
            })
        })
        .collect()
}

fn is_logo(url: &str) -> bool {
    url.to_lowercase().contains("logo")
}

/// Resolve relative references against the page URL.
fn absolutize(src: &str, page_url: &str) -> String {
    match url::Url::parse(page_url).and_then(|base| base.join(src)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => src.to_string(),
    }
}

fn container_image(container: ElementRef<'_>, page_url: &str, images: &ImagePolicy) -> Option<String> {
    let selector = Selector::parse("img").ok()?;
    container.select(&selector).find_map(|img| {
        let attrs = img.value();
        let src = attrs
            .attr("src")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| attrs.attr("data-src"))?
            .trim();
        let src = absolutize(src, page_url);
        let own_asset = src.contains(&images.host) && src.contains(&images.path_marker);
        (own_asset && !is_logo(&src)).then_some(src)
    })
}

fn social_preview_image(document: &Html, page_url: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:image"]"#).ok()?;
    let content = document.select(&selector).next()?.value().attr("content")?.trim();
    if content.is_empty() || is_logo(content) {
        return None;
    }
    Some(absolutize(content, page_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
          <meta property="og:image" content="https://wabetainfo.com/wp-content/uploads/og.png">
        </head><body>
          <div class="sidebar"><p>Sidebar text that is not part of the article.</p></div>
          <div class="entry-content">
            <img src="https://wabetainfo.com/wp-content/uploads/WABetaInfo-logo.png">
            <img src="https://cdn.example.com/wp-content/uploads/elsewhere.png">
            <img data-src="https://wabetainfo.com/wp-content/uploads/2024/01/shot.jpg">
            <p>WABetaInfo spotted a new feature in the latest beta.</p>
            <p>short</p>
            <h3>What is changing for users</h3>
            <ul><li>Chats can now be locked individually</li></ul>
            <blockquote>This feature is under development.</blockquote>
            <p>Follow WABetaInfo on X for more news & updates.</p>
          </div>
        </body></html>
    "#;

    #[test]
    fn extracts_blocks_in_document_order() {
        let article = extract_from_html(PAGE, "https://wabetainfo.com/post/", &ImagePolicy::default());
        let kinds: Vec<_> = article.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Paragraph,
                BlockKind::Subheading,
                BlockKind::ListItem,
                BlockKind::Quote,
                BlockKind::Paragraph
            ]
        );
        // normalized at extraction time
        assert_eq!(article.blocks[0].text, "WABeta News spotted a new feature in the latest beta.");
        assert!(!article.body().contains("Sidebar"));
    }

    #[test]
    fn renders_each_block_kind() {
        let article = extract_from_html(PAGE, "https://wabetainfo.com/post/", &ImagePolicy::default());
        let body = article.body();
        assert!(body.contains("<b>📌 What is changing for users</b>"));
        assert!(body.contains("• Chats can now be locked individually"));
        assert!(body.contains("<i>「This feature is under development.」</i>"));
        assert!(body.contains("news &amp; updates"));
        assert_eq!(
            article.plain_text(),
            "WABeta News spotted a new feature in the latest beta. \
             What is changing for users. \
             Chats can now be locked individually. \
             This feature is under development. \
             Follow WABeta News on Telegram for more news & updates."
        );
    }

    #[test]
    fn list_only_article_still_has_text() {
        let html = r#"
            <html><body><div class="entry-content">
              <h3>New privacy controls</h3>
              <ul>
                <li>Users can now lock individual chats with a passcode</li>
                <li>Locked chats are hidden from the main chat list</li>
              </ul>
              <blockquote>The feature is rolling out to beta testers</blockquote>
            </div></body></html>
        "#;
        let article = extract_from_html(html, "https://wabetainfo.com/post/", &ImagePolicy::default());
        assert_eq!(article.blocks.len(), 4);
        assert!(!article.blocks.iter().any(|b| b.kind == BlockKind::Paragraph));
        assert_eq!(
            article.plain_text(),
            "New privacy controls. \
             Users can now lock individual chats with a passcode. \
             Locked chats are hidden from the main chat list. \
             The feature is rolling out to beta testers."
        );
    }

    #[test]
    fn picks_first_own_non_logo_image() {
        let article = extract_from_html(PAGE, "https://wabetainfo.com/post/", &ImagePolicy::default());
        assert_eq!(
            article.image_url.as_deref(),
            Some("https://wabetainfo.com/wp-content/uploads/2024/01/shot.jpg")
        );
    }

    #[test]
    fn falls_back_through_containers_and_og_image() {
        let html = r#"
            <html><head><meta property="og:image" content="/wp-content/uploads/preview.jpg"></head>
            <body><main><p>Only a main element holds the text here.</p></main></body></html>
        "#;
        let article = extract_from_html(html, "https://wabetainfo.com/a/b/", &ImagePolicy::default());
        assert_eq!(article.plain_text(), "Only a main element holds the text here.");
        assert_eq!(
            article.image_url.as_deref(),
            Some("https://wabetainfo.com/wp-content/uploads/preview.jpg")
        );
    }

    #[test]
    fn logo_only_page_has_no_image() {
        let html = r#"
            <html><head><meta property="og:image" content="https://wabetainfo.com/LOGO.png"></head>
            <body><article><p>Text without any usable picture at all.</p></article></body></html>
        "#;
        let article = extract_from_html(html, "https://wabetainfo.com/x/", &ImagePolicy::default());
        assert!(article.image_url.is_none());
        assert!(!article.is_empty());
    }

    #[test]
    fn page_without_container_is_empty() {
        let article = extract_from_html("<html><body><p>Loose paragraph text.</p></body></html>", "https://x.y/", &ImagePolicy::default());
        assert!(article.is_empty());
        assert_eq!(article.body(), "");
    }
}
