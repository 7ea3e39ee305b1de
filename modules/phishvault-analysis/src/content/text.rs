//! Regex-level markup handling: visible text, phrase scanning and the
//! structural tokens used for campaign clustering.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Phrases typical of credential lures, matched case-insensitively.
pub const SUSPICIOUS_PHRASES: &[&str] = &[
    "verify your account",
    "verify your identity",
    "update payment",
    "suspended",
    "unusual activity",
    "confirmation required",
    "expires in 24",
    "immediately",
    "action required",
];

/// Tags that say something about a page's skeleton.
const STRUCTURAL_TAGS: &[&str] = &[
    "form", "input", "button", "select", "textarea", "label", "iframe", "script", "img", "a",
    "link", "meta", "table", "svg",
];

static RE_HIDDEN_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>")
        .expect("valid regex")
});
static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static RE_OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("valid regex")
});
static RE_TYPE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)type\s*=\s*["']?([a-z-]+)"#).expect("valid regex")
});
static RE_NAME_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)name\s*=\s*["']?([^"'\s>]+)"#).expect("valid regex")
});

/// Text a user would see: comments, scripts and styles dropped, tags
/// stripped, common entities decoded, whitespace collapsed.
pub fn visible_text(markup: &str) -> String {
    let without_blocks = RE_HIDDEN_BLOCK.replace_all(markup, " ");
    let without_tags = RE_TAG.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        // Last, so "&amp;lt;" decodes to "&lt;" and not "<".
        .replace("&amp;", "&")
}

/// Suspicious phrases present in `text`, in list order.
pub fn suspicious_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    SUSPICIOUS_PHRASES
        .iter()
        .filter(|phrase| lower.contains(*phrase))
        .map(|phrase| phrase.to_string())
        .collect()
}

/// Structural fingerprint of a page: tag names from a fixed set,
/// `input:<type>` per input and `field:<name>` per named form control.
/// Sorted and de-duplicated.
pub fn dom_tokens(markup: &str) -> Vec<String> {
    let mut tokens = BTreeSet::new();
    for cap in RE_OPEN_TAG.captures_iter(markup) {
        let tag = cap[1].to_lowercase();
        if !STRUCTURAL_TAGS.contains(&tag.as_str()) {
            continue;
        }
        let attrs = cap.get(2).map_or("", |m| m.as_str());

        if tag == "input" {
            let input_type = RE_TYPE_ATTR
                .captures(attrs)
                .map(|c| c[1].to_lowercase())
                .unwrap_or_else(|| "text".to_string());
            tokens.insert(format!("input:{input_type}"));
        }
        if matches!(tag.as_str(), "input" | "select" | "textarea") {
            if let Some(c) = RE_NAME_ATTR.captures(attrs) {
                tokens.insert(format!("field:{}", c[1].to_lowercase()));
            }
        }
        tokens.insert(tag);
    }
    tokens.into_iter().collect()
}
