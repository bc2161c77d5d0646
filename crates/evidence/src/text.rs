//! Raw evidence text

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Unstructured text returned by an evidence source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawText(String);

impl RawText {
    /// Wrap provider output
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Copy truncated to at most `max_chars` characters, with a trailing
    /// marker when something was cut.
    pub fn truncated(&self, max_chars: usize) -> RawText {
        let mut chars = self.0.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            RawText(format!("{}\n...(truncated)", head))
        } else {
            RawText(head)
        }
    }

    /// Creation time of a rendered social post (`@author (time): text`),
    /// when the source reported a parseable one.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        let captures = post_header_pattern().captures(&self.0)?;
        parse_post_time(captures.get(1)?.as_str())
    }

    /// First http(s) URL mentioned in the text.
    pub fn first_url(&self) -> Option<&str> {
        url_pattern().find(&self.0).map(|m| m.as_str())
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RawText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RawText {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RawText {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("static url regex"))
}

fn post_header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^@\S+ \(([^)]*)\):").expect("static post header regex"))
}

/// Parse a post timestamp in RFC 3339 or the classic Twitter form
/// (`Tue Dec 10 07:00:30 +0000 2024`).
pub fn parse_post_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y"))
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

fn boilerplate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let blocks = ["script", "style", "nav", "footer", "header", "noscript"]
            .iter()
            .map(|tag| format!(r"<{tag}\b.*?</{tag}\s*>"))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("(?is){}", blocks)).expect("static boilerplate regex")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("static tag regex"))
}

/// Reduce an HTML document to its readable text.
///
/// Drops script/style/navigation blocks and markup, then keeps one
/// non-empty phrase per line.
pub fn extract_page_text(html: &str) -> String {
    let without_blocks = boilerplate_pattern().replace_all(html, "\n");
    let without_tags = tag_pattern().replace_all(&without_blocks, "\n");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded
        .lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
