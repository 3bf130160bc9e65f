// src/bot/text.rs - Normalises aggregator markup into plain comment text

use anyhow::{Context, Result};
use regex::Regex;

pub struct TextCleaner {
    translated: Regex,
    origin: Regex,
    tags: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            translated: Regex::new(r#"(?s)<span[^>]*data-lang="ja"[^>]*>(.*?)</span>"#)
                .context("Failed to compile translation pattern")?,
            origin: Regex::new(r#"(?s)<span[^>]*class="origin"[^>]*>(.*?)</span>"#)
                .context("Failed to compile origin pattern")?,
            tags: Regex::new(r"<[^>]+>").context("Failed to compile tag pattern")?,
        })
    }

    /// Prefer the Japanese translation span, then the original-text span, then
    /// the raw text with all tags removed.
    pub fn clean(&self, raw: &str) -> String {
        let body = self
            .translated
            .captures(raw)
            .or_else(|| self.origin.captures(raw))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(raw);

        let stripped = self.tags.replace_all(body, "");
        let decoded = decode_entities(&stripped);
        let without_newlines: String = decoded.chars().filter(|c| *c != '\r' && *c != '\n').collect();

        strip_brackets(without_newlines.trim()).trim().to_string()
    }
}

/// Drop one leading opening bracket and one trailing closing bracket
fn strip_brackets(text: &str) -> &str {
    let text = text
        .strip_prefix('(')
        .or_else(|| text.strip_prefix('（'))
        .unwrap_or(text);
    text.strip_suffix(')')
        .or_else(|| text.strip_suffix('）'))
        .unwrap_or(text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TextCleaner {
        TextCleaner::new().unwrap()
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(cleaner().clean("こんにちは"), "こんにちは");
    }

    #[test]
    fn test_prefers_japanese_translation() {
        let raw = r#"<span class="origin">hello</span><span class="translated" data-lang="ja">こんにちは</span>"#;
        assert_eq!(cleaner().clean(raw), "こんにちは");
    }

    #[test]
    fn test_falls_back_to_origin_span() {
        let raw = r#"<span class="origin">hello there</span><span data-lang="en">hi</span>"#;
        assert_eq!(cleaner().clean(raw), "hello there");
    }

    #[test]
    fn test_strips_tags_brackets_and_newlines() {
        let raw = "（<img alt=\"smile\" src=\"x.png\">今日も\r\nがんばって）";
        assert_eq!(cleaner().clean(raw), "今日もがんばって");
        assert_eq!(cleaner().clean("(a &amp; b)"), "a & b");
    }
}
