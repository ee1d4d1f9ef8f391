//! Word document (docx) extraction: paragraphs, tables, headings and core
//! properties.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ooxml::{self, attr, local_name, xml_error};
use super::types::*;
use super::Extractor;
use crate::config::ExtractionLimits;
use crate::error::SharePointError;

pub struct DocxExtractor;

#[derive(Debug, Default)]
struct DocxBody {
    paragraphs: Vec<String>,
    tables: Vec<Table>,
    headings: Vec<Heading>,
}

/// Heading level from a paragraph style id (`Heading2`, `Title`).
fn heading_level(style: &str) -> Option<u8> {
    if style.eq_ignore_ascii_case("title") {
        return Some(0);
    }
    let rest = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("heading"))?;
    rest.trim().parse::<u8>().ok().filter(|l| (1..=9).contains(l))
}

fn parse_body(xml: &str) -> Result<DocxBody, SharePointError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut body = DocxBody::default();

    let mut para = String::new();
    let mut style: Option<String> = None;
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut table: Table = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e).as_str() {
                "p" => {
                    para.clear();
                    style = None;
                }
                "t" => in_text = true,
                "tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table.clear();
                    }
                }
                "tr" if table_depth == 1 => row.clear(),
                "tc" if table_depth == 1 => cell.clear(),
                "pStyle" => style = attr(e, b"val"),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match local_name(e).as_str() {
                "pStyle" => style = attr(e, b"val"),
                "tab" => para.push('\t'),
                "br" | "cr" => para.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                para.push_str(&e.unescape().map_err(|e| xml_error("document.xml", e))?);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = para.trim().to_string();
                    if table_depth > 0 {
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push('\n');
                            }
                            cell.push_str(&text);
                        }
                    } else if !text.is_empty() {
                        if let Some(level) = style.as_deref().and_then(heading_level) {
                            body.headings.push(Heading {
                                level,
                                text: text.clone(),
                            });
                        }
                        body.paragraphs.push(text);
                    }
                    para.clear();
                }
                b"tc" if table_depth == 1 => row.push(std::mem::take(&mut cell)),
                b"tr" if table_depth == 1 => table.push(std::mem::take(&mut row)),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 {
                        body.tables.push(std::mem::take(&mut table));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("document.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(body)
}

impl Extractor for DocxExtractor {
    fn format(&self) -> FormatTag {
        FormatTag::WordDocument
    }

    fn extract(
        &self,
        _extension: &str,
        bytes: &[u8],
        limits: &ExtractionLimits,
        result: &mut ExtractionResult,
    ) -> Result<(), SharePointError> {
        let mut archive = ooxml::open_archive(bytes)?;
        let xml = ooxml::read_entry(&mut archive, "word/document.xml")?.ok_or_else(|| {
            SharePointError::Extraction("package has no word/document.xml".to_string())
        })?;
        let body = parse_body(&xml)?;
        let metadata = ooxml::core_properties(&mut archive)?;

        let mut stats = BTreeMap::new();
        stats.insert("paragraphs".to_string(), body.paragraphs.len() as f64);
        stats.insert("tables".to_string(), body.tables.len() as f64);
        stats.insert(
            "words".to_string(),
            body.paragraphs
                .iter()
                .map(|p| p.split_whitespace().count())
                .sum::<usize>() as f64,
        );

        if body.paragraphs.len() > limits.max_paragraphs || body.tables.len() > limits.max_tables
        {
            result.truncated = true;
        }

        let paragraphs: Vec<String> = body
            .paragraphs
            .into_iter()
            .take(limits.max_paragraphs)
            .collect();
        let (content, cut) = truncate_text(&paragraphs.join("\n"), limits.max_text_chars);
        result.truncated |= cut;

        result.insert("content", SectionContent::Text(content));
        result.insert("paragraphs", SectionContent::List(paragraphs));
        result.insert(
            "tables",
            SectionContent::Tables(body.tables.into_iter().take(limits.max_tables).collect()),
        );
        if !body.headings.is_empty() {
            result.insert("headings", SectionContent::Headings(body.headings));
        }
        if !metadata.is_empty() {
            result.insert("metadata", SectionContent::Metadata(metadata));
        }
        result.insert("statistics", SectionContent::Statistics(stats));
        Ok(())
    }
}
