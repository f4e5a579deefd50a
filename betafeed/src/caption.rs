//! Length-bounded rendering of channel posts.
//!
//! Lengths are measured in UTF-16 code units, which is how the messaging platform
//! counts; this is never smaller than the char count, so a caption within budget
//! in code units is also within budget in characters.

use crate::categorize::Category;
use crate::normalize::split_sentences;

/// Ceiling for a caption attached to a photo.
pub const CAPTION_LIMIT: usize = 1024;
/// Ceiling for a standalone text message.
pub const MESSAGE_LIMIT: usize = 4096;

const RULE: &str = "━━━━━━━━━━━━━━━";
const BASE_HASHTAGS: [&str; 4] = ["#WhatsApp", "#WhatsAppUpdate", "#WABeta_News", "#WhatsAppNews"];
const MAX_HASHTAGS: usize = 6;

pub fn display_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Escape the three characters the platform's HTML subset treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Context tags first, then the base tags, capped at six.
pub fn hashtags(title: &str, category: Category) -> Vec<&'static str> {
    let lowered = title.to_lowercase();
    let mut tags = Vec::new();
    if lowered.contains("beta") {
        tags.push("#Beta");
    }
    if lowered.contains("android") || category == Category::Android {
        tags.push("#Android");
    }
    if lowered.contains("ios") || category == Category::Ios {
        tags.push("#iOS");
    }
    for tag in BASE_HASHTAGS {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.truncate(MAX_HASHTAGS);
    tags
}

/// Renders the channel caption: header, summary, hashtag footer.
#[derive(Debug, Clone)]
pub struct CaptionFormatter {
    channel_username: String,
}

impl CaptionFormatter {
    pub fn new(channel_username: impl Into<String>) -> Self {
        Self {
            channel_username: channel_username.into(),
        }
    }

    /// Format a post caption that never exceeds `max_chars`.
    ///
    /// `title` and `body` are plain text; they are HTML-escaped here. When the body
    /// does not fit it is cut back to whole sentences.
    pub fn format(&self, title: &str, body: &str, category: Category, max_chars: usize) -> String {
        let footer = self.footer(title, category);
        let mut head = header(&escape_html(title), category);

        // An absurdly long title must not eat the whole budget.
        let fixed_budget = max_chars.saturating_sub(display_len(&footer));
        if display_len(&head) > fixed_budget {
            let bare = display_len(&header("", category));
            let room = fixed_budget.saturating_sub(bare);
            head = header_for_truncated_title(title, category, room);
        }

        let available = max_chars.saturating_sub(display_len(&head) + display_len(&footer));
        let body = escape_html(body.trim());
        let body = fit_body(&body, available);

        let caption = format!("{head}{body}{footer}");
        if display_len(&caption) <= max_chars {
            caption
        } else {
            // Only reachable when max_chars cannot even hold the fixed parts.
            truncate_units(&caption, max_chars)
        }
    }

    fn footer(&self, title: &str, category: Category) -> String {
        let tags = hashtags(title, category).join(" ");
        format!(
            "</i>\n\n{RULE}\n\n{tags}\n\n{RULE}\n\n📢 Join Our Channel:\n{}",
            self.channel_username
        )
    }
}

fn header(escaped_title: &str, category: Category) -> String {
    format!("📰 <b>{}</b>\n\n{} Summary:\n<i>", escaped_title, category.emoji())
}

fn header_for_truncated_title(title: &str, category: Category, room: usize) -> String {
    // Escape after cutting so no entity is split.
    let mut cut = truncate_with_ellipsis(title, room);
    while display_len(&escape_html(&cut)) > room && !cut.is_empty() {
        let shorter = display_len(&cut).saturating_sub(2);
        cut = truncate_with_ellipsis(title, shorter);
    }
    header(&escape_html(&cut), category)
}

/// Keep whole sentences while `running + len + 1 <= available`.
///
/// If not even the first sentence fits, it is hard-cut and ends with "…".
fn fit_body(body: &str, available: usize) -> String {
    if display_len(body) <= available {
        return body.to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut running = 0;
    for sentence in split_sentences(body) {
        let len = display_len(sentence);
        if running + len + 1 > available {
            break;
        }
        kept.push(sentence);
        running += len + 1;
    }

    if kept.is_empty() {
        return truncate_escaped_with_ellipsis(body, available);
    }

    let mut text = kept.join(" ");
    if !text.ends_with(['.', '!', '?']) {
        text = text.trim_end().to_string();
        text.push('.');
    }
    text
}

/// Cut to at most `max_units` code units including a trailing "…".
fn truncate_with_ellipsis(text: &str, max_units: usize) -> String {
    if display_len(text) <= max_units {
        return text.to_string();
    }
    if max_units == 0 {
        return String::new();
    }
    with_ellipsis(truncate_units(text, max_units - 1))
}

/// Same as [`truncate_with_ellipsis`] for already escaped text: an entity such
/// as "&amp;" is never left half cut.
fn truncate_escaped_with_ellipsis(text: &str, max_units: usize) -> String {
    if display_len(text) <= max_units {
        return text.to_string();
    }
    if max_units == 0 {
        return String::new();
    }
    let mut cut = truncate_units(text, max_units - 1);
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    with_ellipsis(cut)
}

fn with_ellipsis(cut: String) -> String {
    let mut cut = cut.trim_end().to_string();
    cut.push('…');
    cut
}

pub fn truncate_units(text: &str, max_units: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.len_utf16();
        if used + w > max_units {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

/// Split a long standalone message into ordered chunks of at most `max_len`
/// code units, preferring to break at the last newline inside each window.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || display_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while display_len(rest) > max_len {
        let window_end = unit_window_end(rest, max_len);
        let split_at = match rest[..window_end].rfind('\n') {
            Some(i) if i > 0 => i,
            _ => window_end,
        };
        let chunk = &rest[..split_at];
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = rest[split_at..].trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Byte offset of the longest prefix that fits in `max_units` code units.
/// Always advances by at least one char.
fn unit_window_end(text: &str, max_units: usize) -> usize {
    let mut used = 0;
    for (i, c) in text.char_indices() {
        used += c.len_utf16();
        if used > max_units {
            return if i == 0 { c.len_utf8() } else { i };
        }
    }
    text.len()
}
