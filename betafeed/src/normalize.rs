//! Text helpers: brand/entity rewriting applied to every piece of text we
//! republish, and the sentence splitter shared by summarizing and captioning.

use regex::Regex;
use std::sync::LazyLock;

/// Literal substitutions, applied in order over the whole string.
/// No replacement may contain a pattern that an earlier or later rule matches.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("WABetaInfo on X", "WABeta News on Telegram"),
    ("wabetainfo on X", "WABeta News on Telegram"),
    ("WABetaInfo", "WABeta News"),
    ("wabetainfo", "WABeta News"),
    ("WaBetaInfo", "WABeta News"),
    ("WABETAINFO", "WABeta News"),
    (" on X,", " on Telegram,"),
    (" on X.", " on Telegram."),
    (" on X ", " on Telegram "),
    ("Twitter", "Telegram"),
    ("twitter", "Telegram"),
];

static BRAND_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWABetaInfo\b").expect("valid brand regex"));

static ON_X: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon X\b").expect("valid platform regex"));

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence regex"));

/// Split on whitespace that follows terminal punctuation. The punctuation stays
/// with its sentence; the input is trimmed first and empty pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        // punctuation is ASCII, so +1 stays on a char boundary
        let end = m.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Rewrite brand and platform references. Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut result = text.to_string();
    for (old, new) in REPLACEMENTS {
        if result.contains(old) {
            result = result.replace(old, new);
        }
    }

    let result = BRAND_WORD.replace_all(&result, "WABeta News");
    ON_X.replace_all(&result, "on Telegram").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_brand_and_platform() {
        let out = normalize("WABetaInfo released a beta on X");
        assert!(out.contains("WABeta News"));
        assert!(out.contains("on Telegram"));
        assert!(!out.contains("WABetaInfo"));
        assert!(!out.contains(" on X"));
    }

    #[test]
    fn catch_all_is_case_insensitive() {
        assert_eq!(normalize("Thanks to wAbEtAiNfO!"), "Thanks to WABeta News!");
        assert_eq!(normalize("Follow us ON x for more"), "Follow us on Telegram for more");
    }

    #[test]
    fn leaves_unrelated_words_alone() {
        assert_eq!(normalize("Available on Xbox"), "Available on Xbox");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn splits_after_terminal_punctuation() {
        let parts = split_sentences("  First one. Second!\nThird?  Tail without stop ");
        assert_eq!(parts, vec!["First one.", "Second!", "Third?", "Tail without stop"]);
        assert_eq!(split_sentences("v2.23.1 is out. Yes"), vec!["v2.23.1 is out.", "Yes"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "WABetaInfo on X, announced on Twitter.",
            "wabetainfo on X said twitter users on X can chat",
            "WABETAINFO and WaBetaInfo on X.",
            "Nothing to rewrite here",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }
}
