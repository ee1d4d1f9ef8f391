//! PDF extraction: page text, document info and AcroForm fields.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object};
use tracing::debug;

use super::types::*;
use super::Extractor;
use crate::config::ExtractionLimits;
use crate::error::SharePointError;

pub struct PdfExtractor;

const INFO_KEYS: &[(&[u8], &str)] = &[
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Subject", "subject"),
    (b"Keywords", "keywords"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
    (b"CreationDate", "created"),
    (b"ModDate", "last_modified"),
];

const MAX_FIELD_DEPTH: usize = 8;

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn object_text(doc: &Document, object: &Object) -> Option<String> {
    let object = match object {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Integer(i) => Some(i.to_string()),
        Object::Real(r) => Some(r.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn document_info(doc: &Document) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    let Some(dict) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| resolve_dict(doc, object))
    else {
        return info;
    };
    for (key, name) in INFO_KEYS {
        if let Some(value) = dict.get(key).ok().and_then(|v| object_text(doc, v)) {
            let value = value.trim().to_string();
            if !value.is_empty() {
                info.insert(name.to_string(), value);
            }
        }
    }
    info
}

fn form_fields(doc: &Document) -> Vec<FormField> {
    let mut fields = Vec::new();
    let Some(acroform) = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"AcroForm").ok())
        .and_then(|object| resolve_dict(doc, object))
    else {
        return fields;
    };
    let Some(list) = acroform.get(b"Fields").ok().and_then(|f| match f {
        Object::Array(items) => Some(items.clone()),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok().cloned(),
        _ => None,
    }) else {
        return fields;
    };
    for field in &list {
        collect_field(doc, field, None, 0, &mut fields);
    }
    fields
}

fn collect_field(
    doc: &Document,
    object: &Object,
    parent: Option<&str>,
    depth: usize,
    out: &mut Vec<FormField>,
) {
    if depth > MAX_FIELD_DEPTH {
        return;
    }
    let Some(dict) = resolve_dict(doc, object) else {
        return;
    };
    let partial = dict.get(b"T").ok().and_then(|t| object_text(doc, t));
    let name = match (parent, partial.as_deref()) {
        (Some(p), Some(t)) => format!("{}.{}", p, t),
        (Some(p), None) => p.to_string(),
        (None, Some(t)) => t.to_string(),
        (None, None) => String::new(),
    };

    if let Ok(Object::Array(kids)) = dict.get(b"Kids") {
        let named_kids = kids.iter().any(|kid| {
            resolve_dict(doc, kid).is_some_and(|d| d.get(b"T").is_ok())
        });
        if named_kids {
            for kid in kids {
                collect_field(doc, kid, Some(&name), depth + 1, out);
            }
            return;
        }
    }

    if !name.is_empty() {
        out.push(FormField {
            name,
            value: dict.get(b"V").ok().and_then(|v| object_text(doc, v)),
        });
    }
}

impl Extractor for PdfExtractor {
    fn format(&self) -> FormatTag {
        FormatTag::Pdf
    }

    fn extract(
        &self,
        _extension: &str,
        bytes: &[u8],
        limits: &ExtractionLimits,
        result: &mut ExtractionResult,
    ) -> Result<(), SharePointError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| SharePointError::Extraction(format!("failed to load PDF: {}", e)))?;
        if doc.is_encrypted() {
            result.warn("document is encrypted; text may be unavailable");
        }

        let pages = doc.get_pages();
        let page_count = pages.len();
        let mut page_texts = Vec::new();
        for (&number, _) in pages.iter().take(limits.max_pdf_pages) {
            match doc.extract_text(&[number]) {
                Ok(text) => page_texts.push(text.trim().to_string()),
                Err(e) => {
                    debug!(target: "sharepoint.documents", page = number, error = %e, "pdf text extraction failed");
                    result.warn(format!("page {}: text could not be extracted", number));
                    page_texts.push(String::new());
                }
            }
        }
        if page_count > limits.max_pdf_pages {
            result.truncated = true;
        }

        let (content, cut) = truncate_text(
            &page_texts
                .iter()
                .filter(|t| !t.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n\n"),
            limits.max_text_chars,
        );
        result.truncated |= cut;

        let mut stats = BTreeMap::new();
        stats.insert("pages".to_string(), page_count as f64);
        stats.insert("pages_extracted".to_string(), page_texts.len() as f64);

        result.insert("content", SectionContent::Text(content));
        result.insert("pages", SectionContent::List(page_texts));
        result.insert("statistics", SectionContent::Statistics(stats));

        let info = document_info(&doc);
        if !info.is_empty() {
            result.insert("metadata", SectionContent::Metadata(info));
        }
        let fields = form_fields(&doc);
        if !fields.is_empty() {
            result.insert("form_fields", SectionContent::FormFields(fields));
        }
        Ok(())
    }
}
