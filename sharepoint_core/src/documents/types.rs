use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw document bytes plus what the server said about them.
#[derive(Clone)]
pub struct DocumentPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

impl DocumentPayload {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl std::fmt::Debug for DocumentPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPayload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    Spreadsheet,
    WordDocument,
    Pdf,
    Text,
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Spreadsheet => "spreadsheet",
            FormatTag::WordDocument => "word-document",
            FormatTag::Pdf => "pdf",
            FormatTag::Text => "text",
        }
    }
}

pub type Table = Vec<Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub name: String,
    pub non_empty: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub header: Vec<String>,
    /// First data rows, header excluded.
    pub rows: Vec<Vec<String>>,
    /// Data rows in the sheet, header excluded.
    pub total_rows: usize,
    pub columns: Vec<ColumnStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SectionContent {
    Text(String),
    List(Vec<String>),
    Tables(Vec<Table>),
    Sheet(SheetSummary),
    FormFields(Vec<FormField>),
    Metadata(BTreeMap<String, String>),
    Statistics(BTreeMap<String, f64>),
    Headings(Vec<Heading>),
}

/// Normalized output of every extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub format: FormatTag,
    pub filename: String,
    pub empty: bool,
    pub truncated: bool,
    pub sections: BTreeMap<String, SectionContent>,
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn new(format: FormatTag, filename: impl Into<String>) -> Self {
        Self {
            format,
            filename: filename.into(),
            empty: false,
            truncated: false,
            sections: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// True when extraction produced no warnings.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: SectionContent) {
        self.sections.insert(name.into(), content);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn section(&self, name: &str) -> Option<&SectionContent> {
        self.sections.get(name)
    }

    /// The main text section, when the extractor produced one.
    pub fn content(&self) -> Option<&str> {
        match self.sections.get("content") {
            Some(SectionContent::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// Cut `text` to at most `max` characters.
pub(crate) fn truncate_text(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

pub(crate) fn text_statistics(text: &str) -> BTreeMap<String, f64> {
    let mut stats = BTreeMap::new();
    stats.insert("lines".to_string(), text.lines().count() as f64);
    stats.insert("words".to_string(), text.split_whitespace().count() as f64);
    stats.insert("characters".to_string(), text.chars().count() as f64);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tags_serialize_as_names() {
        assert_eq!(
            serde_json::to_value(FormatTag::WordDocument).unwrap(),
            "word-document"
        );
        assert_eq!(serde_json::to_value(FormatTag::Pdf).unwrap(), "pdf");
    }

    #[test]
    fn completeness_tracks_warnings() {
        let mut result = ExtractionResult::new(FormatTag::Text, "a.txt");
        assert!(result.is_complete());
        result.warn("page 2 unreadable");
        assert!(!result.is_complete());
    }

    #[test]
    fn truncation_by_chars() {
        assert_eq!(truncate_text("añb", 2), ("añ".to_string(), true));
        assert_eq!(truncate_text("ab", 2), ("ab".to_string(), false));
    }

    #[test]
    fn statistics_count_lines_words_chars() {
        let stats = text_statistics("one two\nthree");
        assert_eq!(stats["lines"], 2.0);
        assert_eq!(stats["words"], 3.0);
        assert_eq!(stats["characters"], 13.0);
    }
}
