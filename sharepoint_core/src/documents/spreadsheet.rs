//! Spreadsheet extraction for xlsx/xlsm/xls workbooks and CSV files.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ooxml::{self, attr, local_name, xml_error, Archive};
use super::text::decode_text;
use super::types::*;
use super::Extractor;
use crate::config::ExtractionLimits;
use crate::error::SharePointError;

pub struct SpreadsheetExtractor;

impl Extractor for SpreadsheetExtractor {
    fn format(&self) -> FormatTag {
        FormatTag::Spreadsheet
    }

    fn extract(
        &self,
        extension: &str,
        bytes: &[u8],
        limits: &ExtractionLimits,
        result: &mut ExtractionResult,
    ) -> Result<(), SharePointError> {
        let sheets = if extension == "xls" {
            super::xls::read_workbook(bytes, result)?
        } else if extension == "csv" {
            let (text, _) = decode_text(bytes);
            let name = result
                .filename
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or_else(|| result.filename.clone());
            vec![(name, parse_csv(&text))]
        } else {
            let mut archive = ooxml::open_archive(bytes)?;
            let sheets = read_workbook(&mut archive, result)?;
            let metadata = ooxml::core_properties(&mut archive)?;
            if !metadata.is_empty() {
                result.insert("metadata", SectionContent::Metadata(metadata));
            }
            sheets
        };

        let names: Vec<String> = sheets.iter().map(|(name, _)| name.clone()).collect();
        for (name, rows) in sheets {
            let summary = summarize(&name, rows, limits.max_rows_preview);
            if summary.total_rows > summary.rows.len() {
                result.truncated = true;
            }
            result.insert(format!("sheet:{}", name), SectionContent::Sheet(summary));
        }
        result.insert("sheets", SectionContent::List(names));
        Ok(())
    }
}

/// Header row, preview rows and per-column statistics for one sheet.
pub fn summarize(name: &str, rows: Vec<Vec<String>>, preview: usize) -> SheetSummary {
    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    let data: Vec<Vec<String>> = rows.collect();

    let width = data
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);

    let columns = (0..width)
        .map(|idx| {
            let name = header
                .get(idx)
                .filter(|h| !h.is_empty())
                .cloned()
                .unwrap_or_else(|| column_letters(idx));
            column_stats(name, data.iter().map(|row| row.get(idx).map(String::as_str)))
        })
        .collect();

    SheetSummary {
        name: name.to_string(),
        header,
        total_rows: data.len(),
        rows: data.into_iter().take(preview).collect(),
        columns,
    }
}

fn column_stats<'a>(name: String, cells: impl Iterator<Item = Option<&'a str>>) -> ColumnStats {
    let values: Vec<&str> = cells
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.parse::<f64>().ok()).collect();

    let numeric = (!numbers.is_empty() && numbers.len() == values.len()).then(|| {
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
        NumericStats { min, max, mean }
    });

    ColumnStats {
        name,
        non_empty: values.len(),
        numeric,
    }
}

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, CRLF or LF rows.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows.retain(|r| r.iter().any(|f| !f.trim().is_empty()));
    rows
}

fn read_workbook(
    archive: &mut Archive<'_>,
    result: &mut ExtractionResult,
) -> Result<Vec<(String, Vec<Vec<String>>)>, SharePointError> {
    let workbook = ooxml::read_entry(archive, "xl/workbook.xml")?.ok_or_else(|| {
        SharePointError::Extraction("workbook has no xl/workbook.xml".to_string())
    })?;
    let targets = match ooxml::read_entry(archive, "xl/_rels/workbook.xml.rels")? {
        Some(rels) => relationship_targets(&rels)?,
        None => HashMap::new(),
    };
    let shared = match ooxml::read_entry(archive, "xl/sharedStrings.xml")? {
        Some(xml) => shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut sheets = Vec::new();
    for (position, (name, rel_id)) in sheet_list(&workbook)?.into_iter().enumerate() {
        let path = rel_id
            .and_then(|id| targets.get(&id).cloned())
            .map(|target| normalize_target(&target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position + 1));
        match ooxml::read_entry(archive, &path)? {
            Some(xml) => sheets.push((name, sheet_rows(&xml, &shared)?)),
            None => result.warn(format!("sheet '{}' is missing its part {}", name, path)),
        }
    }
    Ok(sheets)
}

fn normalize_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn sheet_list(xml: &str) -> Result<Vec<(String, Option<String>)>, SharePointError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if local_name(e) == "sheet" => {
                if let Some(name) = attr(e, b"name") {
                    sheets.push((name, attr(e, b"id")));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("workbook.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn relationship_targets(xml: &str) -> Result<HashMap<String, String>, SharePointError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if local_name(e) == "Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("workbook.xml.rels", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn shared_strings(xml: &str) -> Result<Vec<String>, SharePointError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e).as_str() {
                "si" => {
                    in_item = true;
                    current.clear();
                }
                "t" => in_text = in_item,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                current.push_str(&e.unescape().map_err(|e| xml_error("sharedStrings.xml", e))?);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) if local_name(e) == "si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("sharedStrings.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column index from a cell reference such as `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters
        .chars()
        .try_fold(0usize, |acc, c| {
            let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            acc.checked_mul(26)?.checked_add(digit)
        })
        .map(|n| n - 1)
}

fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, SharePointError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_col = 0usize;
    let mut cell_type = String::new();
    let mut cell_value = String::new();
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e).as_str() {
                "row" => row.clear(),
                "c" => {
                    cell_col = attr(e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(row.len());
                    cell_type = attr(e, b"t").unwrap_or_default();
                    cell_value.clear();
                }
                "v" | "t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_value => {
                cell_value.push_str(&e.unescape().map_err(|e| xml_error("worksheet", e))?);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let value = match cell_type.as_str() {
                        "s" => cell_value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default(),
                        "b" => match cell_value.trim() {
                            "1" => "TRUE".to_string(),
                            "0" => "FALSE".to_string(),
                            other => other.to_string(),
                        },
                        _ => cell_value.clone(),
                    };
                    if row.len() <= cell_col {
                        row.resize(cell_col + 1, String::new());
                    }
                    row[cell_col] = value;
                }
                b"row" => {
                    if row.iter().any(|v| !v.trim().is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    } else {
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("worksheet", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}
