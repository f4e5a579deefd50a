// Summarizer module
use tracing::{info, warn};

use super::{SummaryOptions, SummaryProvider, SummaryRequest};
use crate::normalize::{normalize, split_sentences};

/// Below this many chars a text is returned as-is.
pub const MIN_SUMMARIZABLE_CHARS: usize = 100;
pub const DEFAULT_TARGET_WORDS: usize = 2500;
pub const MAX_KEY_SENTENCES: usize = 8;

const MIN_SENTENCE_CHARS: usize = 20;
/// Sentences kept regardless of score, so the fallback is never empty.
const GUARANTEED_SENTENCES: usize = 3;

const BOILERPLATE: [&str; 5] = ["click here", "subscribe", "follow us", "read more", "advertisement"];

const KEYWORDS: [&str; 26] = [
    "new", "update", "feature", "fix", "bug", "add", "remove", "change", "improve", "support",
    "enable", "disable", "option", "setting", "version", "beta", "stable", "release", "whatsapp",
    "android", "ios", "now", "can", "will", "allow", "introduce",
];

/// Condense article text, with a local extractive fallback when the remote call fails.
///
/// Never fails: the worst case is a word-truncated copy of the input.
pub async fn summarize_text(
    provider: Option<&dyn SummaryProvider>,
    text: &str,
    options: &SummaryOptions,
    target_words: usize,
) -> String {
    if text.chars().count() < MIN_SUMMARIZABLE_CHARS {
        return normalize(text);
    }

    if let Some(provider) = provider {
        let request = SummaryRequest {
            input: text.chars().take(options.input_chars).collect(),
            min_length: options.min_length,
            max_length: options.max_length,
        };
        match provider.summarize(request).await {
            Ok(summary) if !summary.trim().is_empty() => {
                info!("remote summarization successful: {} chars", summary.len());
                return normalize(summary.trim());
            }
            Ok(_) => warn!("remote summarization returned nothing, falling back to extractive summary"),
            Err(e) => warn!("remote summarization failed: {:#}, falling back to extractive summary", e),
        }
    }

    let key_sentences = extract_key_sentences(text, MAX_KEY_SENTENCES);
    if !key_sentences.is_empty() {
        return normalize(&key_sentences.join(" "));
    }

    normalize(&truncate_words(text, target_words))
}

/// Rank sentences by keyword hits and keep the best `max_sentences`.
///
/// Short and boilerplate sentences are skipped. The first three surviving sentences
/// are always kept; the ordering is stable, so equal scores keep document order.
pub fn extract_key_sentences(text: &str, max_sentences: usize) -> Vec<String> {
    let mut scored: Vec<(usize, &str)> = Vec::new();

    for sentence in split_sentences(text) {
        if sentence.chars().count() < MIN_SENTENCE_CHARS {
            continue;
        }
        let lowered = sentence.to_lowercase();
        if BOILERPLATE.iter().any(|b| lowered.contains(b)) {
            continue;
        }

        let score = KEYWORDS.iter().filter(|k| lowered.contains(*k)).count();
        if score > 0 || scored.len() < GUARANTEED_SENTENCES {
            scored.push((score, sentence));
        }
    }

    // sort_by is stable
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(max_sentences)
        .map(|(_, s)| s.to_string())
        .collect()
}

/// Last resort: keep `target_words` words and drop a trailing partial sentence.
pub fn truncate_words(text: &str, target_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let summary = if words.len() > target_words {
        words[..target_words].join(" ")
    } else {
        text.trim().to_string()
    };

    let sentences = split_sentences(&summary);
    if sentences.len() > 1 {
        sentences[..sentences.len() - 1].join(" ")
    } else {
        summary
    }
}
