//! Document content extraction.
//!
//! [`DocumentProcessor`] picks an extractor from a table keyed by file
//! extension (falling back to the declared content type) and normalizes the
//! payload into an [`ExtractionResult`].

mod docx;
mod ooxml;
mod pdf;
mod spreadsheet;
mod text;
pub mod types;
mod xls;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use spreadsheet::{parse_csv, SpreadsheetExtractor};
pub use text::{decode_text, html_to_text, TextExtractor};
pub use types::*;

use crate::config::ExtractionLimits;
use crate::cpu_pool::ExtractionPool;
use crate::error::SharePointError;

/// A format-specific extractor. Implementations fill `result` in place.
pub trait Extractor: Send + Sync {
    fn format(&self) -> FormatTag;

    fn extract(
        &self,
        extension: &str,
        bytes: &[u8],
        limits: &ExtractionLimits,
        result: &mut ExtractionResult,
    ) -> Result<(), SharePointError>;
}

static SPREADSHEET: SpreadsheetExtractor = SpreadsheetExtractor;
static DOCX: DocxExtractor = DocxExtractor;
static PDF: PdfExtractor = PdfExtractor;
static TEXT: TextExtractor = TextExtractor;

static EXTRACTORS: Lazy<HashMap<&'static str, &'static dyn Extractor>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, &'static dyn Extractor> = HashMap::new();
    for ext in ["xlsx", "xlsm", "xls", "csv"] {
        table.insert(ext, &SPREADSHEET);
    }
    table.insert("docx", &DOCX);
    table.insert("pdf", &PDF);
    for ext in ["txt", "text", "log", "md", "markdown", "html", "htm"] {
        table.insert(ext, &TEXT);
    }
    table
});

static CONTENT_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        ),
        ("application/vnd.ms-excel.sheet.macroenabled.12", "xlsm"),
        ("application/vnd.ms-excel", "xls"),
        ("text/csv", "csv"),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        ),
        ("application/msword", "doc"),
        ("application/pdf", "pdf"),
        ("text/plain", "txt"),
        ("text/markdown", "md"),
        ("text/html", "html"),
    ])
});

/// Lower-cased extension of `filename`, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn extension_for(payload: &DocumentPayload) -> Option<String> {
    extension_of(&payload.filename).or_else(|| {
        let content_type = payload.content_type.as_deref()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        CONTENT_TYPES.get(essence.as_str()).map(|e| e.to_string())
    })
}

#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    limits: ExtractionLimits,
    pool: Arc<ExtractionPool>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self {
            limits: ExtractionLimits::default(),
            pool: ExtractionPool::shared(),
        }
    }
}

impl DocumentProcessor {
    /// Builds a dedicated pool when `limits.workers` is set; otherwise shares
    /// the process-wide one.
    pub fn new(limits: ExtractionLimits) -> Result<Self, SharePointError> {
        let pool = match limits.workers {
            0 => ExtractionPool::shared(),
            n => Arc::new(ExtractionPool::new(n)?),
        };
        Ok(Self { limits, pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    pub fn limits(&self) -> &ExtractionLimits {
        &self.limits
    }

    pub fn supports(&self, filename: &str) -> bool {
        extension_of(filename).is_some_and(|ext| EXTRACTORS.contains_key(ext.as_str()))
    }

    pub fn extract(&self, payload: DocumentPayload) -> Result<ExtractionResult, SharePointError> {
        let extension = extension_for(&payload).ok_or_else(|| SharePointError::UnsupportedFormat {
            extension: String::new(),
        })?;
        let extractor = EXTRACTORS.get(extension.as_str()).ok_or_else(|| {
            SharePointError::UnsupportedFormat {
                extension: extension.clone(),
            }
        })?;

        let DocumentPayload {
            bytes, filename, ..
        } = payload;
        let mut result = ExtractionResult::new(extractor.format(), filename);
        if bytes.is_empty() {
            result.empty = true;
            return Ok(result);
        }

        extractor.extract(&extension, &bytes, &self.limits, &mut result)?;
        debug!(
            target: "sharepoint.documents",
            filename = %result.filename,
            format = result.format.as_str(),
            bytes = bytes.len(),
            sections = result.sections.len(),
            truncated = result.truncated,
            warnings = result.warnings.len(),
            "document extracted"
        );
        Ok(result)
    }

    /// [`Self::extract`] on the CPU pool.
    pub async fn extract_async(
        &self,
        payload: DocumentPayload,
    ) -> Result<ExtractionResult, SharePointError> {
        let processor = self.clone();
        self.pool.run(move || processor.extract(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::ooxml::fixtures::{zip_bytes, CORE_XML};
    use super::*;

    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Budget" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    const RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="worksheet" Target="worksheets/budget.xml"/></Relationships>"#;
    const SHARED: &str = r#"<sst><si><t>Dept</t></si><si><t>Amount</t></si><si><r><t>Sal</t></r><r><t>es</t></r></si><si><t>Ops</t></si></sst>"#;
    const SHEET: &str = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>100</v></c></row>
<row r="3"><c r="A3" t="s"><v>3</v></c><c r="B3"><v>50.5</v></c></row>
</sheetData></worksheet>"#;

    fn xlsx() -> Vec<u8> {
        zip_bytes(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/sharedStrings.xml", SHARED),
            ("xl/worksheets/budget.xml", SHEET),
            ("docProps/core.xml", CORE_XML),
        ])
    }

    fn docx() -> Vec<u8> {
        zip_bytes(&[
            (
                "word/document.xml",
                r#"<w:document xmlns:w="w"><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Plan</w:t></w:r></w:p><w:p><w:r><w:t>Ship it.</w:t></w:r></w:p></w:body></w:document>"#,
            ),
            ("docProps/core.xml", CORE_XML),
        ])
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(extension_of("Report.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(extension_of("folder.v2/notes").as_deref(), None);
        assert_eq!(extension_of(".env"), None);
        assert_eq!(extension_of("README"), None);
    }

    #[test]
    fn empty_payload_flags_every_supported_format() {
        let processor = DocumentProcessor::default();
        for name in [
            "a.xlsx", "a.xlsm", "a.xls", "a.csv", "a.docx", "a.pdf", "a.txt", "a.text", "a.log", "a.md",
            "a.markdown", "a.html", "a.htm",
        ] {
            let result = processor
                .extract(DocumentPayload::new(Vec::new(), name))
                .unwrap();
            assert!(result.empty, "{}", name);
            assert!(result.sections.is_empty(), "{}", name);
        }
    }

    #[test]
    fn unsupported_extensions() {
        let processor = DocumentProcessor::default();
        for name in ["legacy.doc", "photo.png"] {
            let err = processor
                .extract(DocumentPayload::new(b"data".to_vec(), name))
                .unwrap_err();
            assert!(
                matches!(err, SharePointError::UnsupportedFormat { .. }),
                "{}",
                name
            );
        }
        let err = processor
            .extract(DocumentPayload::new(Vec::new(), "legacy.doc"))
            .unwrap_err();
        assert!(matches!(err, SharePointError::UnsupportedFormat { ref extension } if extension == "doc"));
    }

    #[test]
    fn content_type_used_without_extension() {
        let payload = DocumentPayload::new(b"hello".to_vec(), "notes")
            .with_content_type("text/plain; charset=utf-8");
        let result = DocumentProcessor::default().extract(payload).unwrap();
        assert_eq!(result.format, FormatTag::Text);
        assert_eq!(result.content(), Some("hello"));
    }

    #[test]
    fn legacy_workbooks_dispatch_to_spreadsheet() {
        let processor = DocumentProcessor::default();
        assert!(processor.supports("legacy.xls"));

        let empty = processor
            .extract(DocumentPayload::new(Vec::new(), "export").with_content_type("application/vnd.ms-excel"))
            .unwrap();
        assert_eq!(empty.format, FormatTag::Spreadsheet);

        let err = processor
            .extract(DocumentPayload::new(b"not biff".to_vec(), "legacy.XLS"))
            .unwrap_err();
        assert!(matches!(err, SharePointError::Extraction(ref m) if m.contains("xls")));
    }

    #[test]
    fn corrupt_payload_is_extraction_error() {
        let processor = DocumentProcessor::default();
        for name in ["broken.xlsx", "broken.xls", "broken.docx", "broken.pdf"] {
            let err = processor
                .extract(DocumentPayload::new(b"not a real file".to_vec(), name))
                .unwrap_err();
            assert!(matches!(err, SharePointError::Extraction(_)), "{}", name);
        }
    }

    #[test]
    fn xlsx_sheet_summary() {
        let result = DocumentProcessor::default()
            .extract(DocumentPayload::new(xlsx(), "budget.xlsx"))
            .unwrap();
        assert_eq!(result.format, FormatTag::Spreadsheet);
        assert!(result.is_complete());
        assert_eq!(
            result.section("sheets"),
            Some(&SectionContent::List(vec!["Budget".to_string()]))
        );
        let Some(SectionContent::Sheet(sheet)) = result.section("sheet:Budget") else {
            panic!("missing sheet section");
        };
        assert_eq!(sheet.header, vec!["Dept", "Amount"]);
        assert_eq!(sheet.rows[0], vec!["Sales", "100"]);
        assert_eq!(sheet.total_rows, 2);
        let amount = sheet.columns[1].numeric.as_ref().unwrap();
        assert_eq!(amount.min, 50.5);
        assert_eq!(amount.max, 100.0);
        assert_eq!(amount.mean, 75.25);
        assert!(matches!(result.section("metadata"), Some(SectionContent::Metadata(m)) if m["title"] == "Quarterly Report"));
    }

    #[test]
    fn csv_preview_is_bounded() {
        let mut csv = String::from("id,score\n");
        for i in 0..25 {
            csv.push_str(&format!("{},{}\n", i, i * 2));
        }
        let result = DocumentProcessor::default()
            .extract(DocumentPayload::new(csv.into_bytes(), "scores.csv"))
            .unwrap();
        let Some(SectionContent::Sheet(sheet)) = result.section("sheet:scores") else {
            panic!("missing sheet section");
        };
        assert_eq!(sheet.rows.len(), 10);
        assert_eq!(sheet.total_rows, 25);
        assert!(result.truncated);
        assert_eq!(sheet.columns[1].numeric.as_ref().unwrap().max, 48.0);
    }

    #[test]
    fn docx_document() {
        let result = DocumentProcessor::default()
            .extract(DocumentPayload::new(docx(), "plan.docx"))
            .unwrap();
        assert_eq!(result.format, FormatTag::WordDocument);
        assert_eq!(result.content(), Some("Plan\nShip it."));
        assert!(matches!(result.section("headings"), Some(SectionContent::Headings(h)) if h.len() == 1));
        assert!(matches!(result.section("metadata"), Some(SectionContent::Metadata(m)) if m["author"] == "Jordan Lee"));
    }

    #[test]
    fn pdf_document() {
        let result = DocumentProcessor::default()
            .extract(DocumentPayload::new(pdf::fixtures::sample_pdf(), "budget.pdf"))
            .unwrap();
        assert_eq!(result.format, FormatTag::Pdf);
        assert!(result.section("pages").is_some());
    }

    #[tokio::test]
    async fn extraction_runs_on_pool() {
        let result = DocumentProcessor::default()
            .extract_async(DocumentPayload::new(b"pooled".to_vec(), "a.txt"))
            .await
            .unwrap();
        assert_eq!(result.content(), Some("pooled"));
    }

    #[tokio::test]
    async fn configured_workers_get_a_dedicated_pool() {
        let processor = DocumentProcessor::new(ExtractionLimits {
            workers: 2,
            ..ExtractionLimits::default()
        })
        .unwrap();
        assert_eq!(processor.workers(), 2);
        let result = processor
            .extract_async(DocumentPayload::new(b"a,b\n1,2\n".to_vec(), "t.csv"))
            .await
            .unwrap();
        assert_eq!(result.format, FormatTag::Spreadsheet);
    }
}
