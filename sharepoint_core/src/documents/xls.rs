//! Legacy BIFF (`.xls`) workbooks.

use std::io::Cursor;

use calamine::{Data, Reader, Xls};

use super::types::ExtractionResult;
use crate::error::SharePointError;

/// Sheet name and row text for every worksheet in an `.xls` workbook.
pub(super) fn read_workbook(
    bytes: &[u8],
    result: &mut ExtractionResult,
) -> Result<Vec<(String, Vec<Vec<String>>)>, SharePointError> {
    let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))
        .map_err(|e| SharePointError::Extraction(format!("invalid xls workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let rows = range
                    .rows()
                    .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
                    .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
                    .collect();
                sheets.push((name, rows));
            }
            Err(e) => result.warn(format!("sheet '{}' could not be read: {}", name, e)),
        }
    }
    Ok(sheets)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Error(e) => format!("#{:?}", e),
        other => other.to_string(),
    }
}
