//! Plain text, Markdown and HTML extraction.

use std::collections::BTreeMap;

use scraper::{Html, Node, Selector};

use super::types::*;
use super::Extractor;
use crate::config::ExtractionLimits;
use crate::error::SharePointError;

pub struct TextExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFlavor {
    Plain,
    Markdown,
    Html,
}

impl TextFlavor {
    fn as_str(&self) -> &'static str {
        match self {
            TextFlavor::Plain => "plain",
            TextFlavor::Markdown => "markdown",
            TextFlavor::Html => "html",
        }
    }
}

/// Decode bytes as UTF-8, falling back to Latin-1. Returns the text and the
/// encoding that was used.
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), "utf-8"),
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), "latin-1"),
    }
}

pub fn detect_flavor(extension: &str, text: &str) -> TextFlavor {
    match extension {
        "html" | "htm" => return TextFlavor::Html,
        "md" | "markdown" => return TextFlavor::Markdown,
        _ => {}
    }
    let head = text.trim_start().get(..64).unwrap_or(text.trim_start());
    let head = head.to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return TextFlavor::Html;
    }
    let markdown_lines = text
        .lines()
        .take(50)
        .filter(|line| {
            let line = line.trim_start();
            line.starts_with("# ") || line.starts_with("## ") || line.starts_with("```")
        })
        .count();
    if markdown_lines >= 2 {
        TextFlavor::Markdown
    } else {
        TextFlavor::Plain
    }
}

/// Visible text of an HTML document with `script`/`style` content removed.
pub fn html_to_text(html: &str) -> (String, Option<String>) {
    let document = Html::parse_document(html);
    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let mut out = String::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "title" | "head"))
        });
        if hidden {
            continue;
        }
        let piece = text.trim();
        if !piece.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(piece);
        }
    }
    (out, title)
}

fn markdown_headings(text: &str) -> Vec<Heading> {
    let mut in_fence = false;
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
                return None;
            }
            if in_fence {
                return None;
            }
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            let rest = trimmed[level..].trim();
            ((1..=6).contains(&level) && trimmed[level..].starts_with(' ') && !rest.is_empty())
                .then(|| Heading {
                    level: level as u8,
                    text: rest.trim_end_matches('#').trim().to_string(),
                })
        })
        .collect()
}

impl Extractor for TextExtractor {
    fn format(&self) -> FormatTag {
        FormatTag::Text
    }

    fn extract(
        &self,
        extension: &str,
        bytes: &[u8],
        limits: &ExtractionLimits,
        result: &mut ExtractionResult,
    ) -> Result<(), SharePointError> {
        let (decoded, encoding) = decode_text(bytes);
        let flavor = detect_flavor(extension, &decoded);

        let mut metadata = BTreeMap::new();
        metadata.insert("format".to_string(), flavor.as_str().to_string());
        metadata.insert("encoding".to_string(), encoding.to_string());

        let text = match flavor {
            TextFlavor::Html => {
                let (text, title) = html_to_text(&decoded);
                if let Some(title) = title {
                    metadata.insert("title".to_string(), title);
                }
                text
            }
            TextFlavor::Markdown => {
                let headings = markdown_headings(&decoded);
                if !headings.is_empty() {
                    result.insert("headings", SectionContent::Headings(headings));
                }
                decoded
            }
            TextFlavor::Plain => decoded,
        };

        let stats = text_statistics(&text);
        let (content, truncated) = truncate_text(&text, limits.max_text_chars);
        result.truncated |= truncated;
        result.insert("content", SectionContent::Text(content));
        result.insert("statistics", SectionContent::Statistics(stats));
        result.insert("metadata", SectionContent::Metadata(metadata));
        Ok(())
    }
}
