use anyhow::{Context, Result};
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER};
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ingestion::FeedEntry;

pub const DEFAULT_FALLBACK_IMAGE: &str =
    "https://upload.wikimedia.org/wikipedia/commons/thumb/6/6b/WhatsApp.svg/512px-WhatsApp.svg.png";

const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

static INLINE_IMG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img[^>]+src=["']([^"']+)["']"#).expect("valid img regex")
});

fn is_logo(url: &str) -> bool {
    url.to_lowercase().contains("logo")
}

fn first_inline_image(html: Option<&str>) -> Option<String> {
    let caps = INLINE_IMG.captures(html?)?;
    let url = caps.get(1)?.as_str();
    (!is_logo(url)).then(|| url.to_string())
}

/// Pick the image to publish with an entry.
///
/// Order: the article page image, then the entry's image media, then the first
/// inline `<img>` of the content and of the summary. Logos never qualify.
pub fn select_image_url(extracted: Option<&str>, entry: &FeedEntry) -> Option<String> {
    if let Some(url) = extracted {
        return Some(url.to_string());
    }

    if let Some(media) = entry
        .media
        .iter()
        .find(|m| m.is_image() && !is_logo(&m.url))
    {
        return Some(media.url.clone());
    }

    first_inline_image(entry.content_html.as_deref())
        .or_else(|| first_inline_image(entry.summary_html.as_deref()))
}

/// An image ready to be uploaded.
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

pub struct ImageFetcher {
    client: Client,
    fallback_url: String,
    referer: Option<String>,
}

impl ImageFetcher {
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        fallback_url: impl Into<String>,
        referer: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            fallback_url: fallback_url.into(),
            referer,
        })
    }

    /// Download `url`, retrying once with the static fallback asset.
    /// `None` means neither could be fetched and the entry cannot be published.
    pub async fn download(&self, url: Option<&str>) -> Option<DownloadedImage> {
        if let Some(url) = url {
            info!("downloading image from {}", url);
            match self.fetch(url, "image.jpg").await {
                Ok(image) => return Some(image),
                Err(e) => warn!("image download failed for {}: {:#}", url, e),
            }
        } else {
            debug!("no image url found, using fallback");
        }

        match self.fetch(&self.fallback_url, "image.png").await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("fallback image download failed for {}: {:#}", self.fallback_url, e);
                None
            }
        }
    }

    async fn fetch(&self, url: &str, file_name: &str) -> Result<DownloadedImage> {
        let mut request = self.client.get(url).header(ACCEPT, IMAGE_ACCEPT);
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }
        let response = request.send().await.context("image request failed")?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !status.is_success() {
            anyhow::bail!("image fetch failed with status: {}", status);
        }
        if !content_type.contains("image") {
            anyhow::bail!("not an image (content-type: '{}')", content_type);
        }

        let bytes = response.bytes().await.context("failed to read image body")?;
        debug!("downloaded {} bytes ({})", bytes.len(), content_type);
        Ok(DownloadedImage {
            bytes: bytes.to_vec(),
            content_type,
            file_name: file_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::MediaRef;

    fn media(url: &str, content_type: Option<&str>) -> MediaRef {
        MediaRef {
            url: url.to_string(),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn extracted_image_wins() {
        let entry = FeedEntry {
            media: vec![media("https://x.y/media.jpg", Some("image/jpeg"))],
            ..FeedEntry::default()
        };
        assert_eq!(
            select_image_url(Some("https://x.y/page.jpg"), &entry).as_deref(),
            Some("https://x.y/page.jpg")
        );
    }

    #[test]
    fn media_skips_logos_and_non_images() {
        let entry = FeedEntry {
            media: vec![
                media("https://x.y/Site-Logo.png", Some("image/png")),
                media("https://x.y/clip.mp4", Some("video/mp4")),
                media("https://x.y/shot.png", Some("image/png")),
            ],
            ..FeedEntry::default()
        };
        assert_eq!(select_image_url(None, &entry).as_deref(), Some("https://x.y/shot.png"));
    }

    #[test]
    fn inline_images_are_scanned_content_first() {
        let entry = FeedEntry {
            content_html: Some(r#"<p>text</p><img class="a" src="https://x.y/logo.png">"#.into()),
            summary_html: Some(r#"<img src='https://x.y/summary.jpg' alt="">"#.into()),
            ..FeedEntry::default()
        };
        assert_eq!(select_image_url(None, &entry).as_deref(), Some("https://x.y/summary.jpg"));

        let entry = FeedEntry {
            content_html: Some(r#"<img src="https://x.y/content.jpg">"#.into()),
            summary_html: Some(r#"<img src="https://x.y/summary.jpg">"#.into()),
            ..FeedEntry::default()
        };
        assert_eq!(select_image_url(None, &entry).as_deref(), Some("https://x.y/content.jpg"));
    }

    #[test]
    fn nothing_found() {
        assert!(select_image_url(None, &FeedEntry::default()).is_none());
    }

    #[tokio::test]
    async fn retries_once_with_fallback() {
        let mut server = mockito::Server::new_async().await;
        let broken = server
            .mock("GET", "/broken.jpg")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>not an image</html>")
            .create_async()
            .await;
        let fallback = server
            .mock("GET", "/fallback.png")
            .match_header("referer", "https://wabetainfo.com/")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([0x89u8, b'P', b'N', b'G'])
            .create_async()
            .await;

        let fetcher = ImageFetcher::new(
            5,
            "test-agent",
            format!("{}/fallback.png", server.url()),
            Some("https://wabetainfo.com/".to_string()),
        )
        .expect("fetcher");
        let image = fetcher
            .download(Some(&format!("{}/broken.jpg", server.url())))
            .await
            .expect("fallback image");

        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes.len(), 4);
        assert_eq!(image.file_name, "image.png");
        broken.assert_async().await;
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn gives_up_when_fallback_fails_too() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server.mock("GET", mockito::Matcher::Any).with_status(404).create_async().await;

        let fetcher = ImageFetcher::new(5, "test-agent", format!("{}/fallback.png", server.url()), None)
            .expect("fetcher");
        assert!(fetcher.download(Some(&format!("{}/a.jpg", server.url()))).await.is_none());
        assert!(fetcher.download(None).await.is_none());
    }
}
