//! Plain-text extraction for resume documents.
//!
//! Only PDF (text layer) and DOCX are supported. The document kind comes
//! from the declared MIME type, then the file extension, then magic bytes.

use std::sync::Arc;
use std::time::Duration;

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Extraction is CPU bound and pdf parsing can stall on odd fonts.
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => PDF_MIME,
            DocumentKind::Docx => DOCX_MIME,
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            PDF_MIME | "application/x-pdf" => Some(DocumentKind::Pdf),
            DOCX_MIME => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    /// Resolve the kind of a document from whatever the source declared.
    pub fn detect(declared_mime: Option<&str>, file_name: &str, bytes: &[u8]) -> Option<Self> {
        let generic = |m: &str| {
            let m = m.to_ascii_lowercase();
            m.starts_with("application/octet-stream") || m.starts_with("binary/")
        };

        if let Some(kind) = declared_mime.filter(|m| !generic(*m)).and_then(Self::from_mime) {
            return Some(kind);
        }
        if let Some(kind) = mime_guess::from_path(file_name)
            .iter()
            .find_map(|m| Self::from_mime(m.essence_str()))
        {
            return Some(kind);
        }
        Self::sniff(bytes)
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(DocumentKind::Pdf);
        }
        // DOCX is a zip container; require the main document part to tell it
        // apart from xlsx/pptx.
        if bytes.starts_with(b"PK\x03\x04") && contains(bytes, b"word/document.xml") {
            return Some(DocumentKind::Docx);
        }
        None
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported file format: {0}. Only PDF and DOCX resumes are supported")]
    UnsupportedFormat(String),

    #[error("No readable text found in document")]
    NoReadableText,

    #[error("Failed to read PDF: {0}")]
    Pdf(String),

    #[error("Failed to read DOCX: {0}")]
    Docx(String),

    #[error("Text extraction timed out after {0}s")]
    Timeout(u64),

    #[error("Text extraction aborted: {0}")]
    Aborted(String),
}

/// Raw text extraction for one supported document kind.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractionError>;
}

/// Default extractor: `pdf-extract` for PDF, `docx-rs` for DOCX.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractionError> {
        match kind {
            DocumentKind::Pdf => extract_pdf(bytes),
            DocumentKind::Docx => extract_docx(bytes),
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    // pdf-extract separates pages with form feeds.
    let pages: Vec<&str> = text
        .split('\x0C')
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect();

    Ok(pages.join("\n\n").replace('\0', ""))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ExtractionError::Docx(e.to_string()))?;

    let mut text = String::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => push_paragraph(&mut text, paragraph),
            docx_rs::DocumentChild::Table(table) => push_table(&mut text, table),
            docx_rs::DocumentChild::StructuredDataTag(tag) => push_tag(&mut text, tag),
            _ => {}
        }
    }

    Ok(text)
}

/// Cells are emitted row by row, one line per cell paragraph.
fn push_table(out: &mut String, table: &docx_rs::Table) {
    for docx_rs::TableChild::TableRow(row) in &table.rows {
        for docx_rs::TableRowChild::TableCell(cell) in &row.cells {
            for content in &cell.children {
                match content {
                    docx_rs::TableCellContent::Paragraph(paragraph) => {
                        push_paragraph(out, paragraph)
                    }
                    docx_rs::TableCellContent::Table(nested) => push_table(out, nested),
                    docx_rs::TableCellContent::StructuredDataTag(tag) => push_tag(out, tag),
                    docx_rs::TableCellContent::TableOfContents(_) => {}
                }
            }
        }
    }
}

fn push_tag(out: &mut String, tag: &docx_rs::StructuredDataTag) {
    for child in &tag.children {
        match child {
            docx_rs::StructuredDataTagChild::Run(run) => push_run(out, run),
            docx_rs::StructuredDataTagChild::Paragraph(paragraph) => push_paragraph(out, paragraph),
            docx_rs::StructuredDataTagChild::Table(table) => push_table(out, table),
            docx_rs::StructuredDataTagChild::StructuredDataTag(nested) => push_tag(out, nested),
            _ => {}
        }
    }
}

fn push_paragraph(out: &mut String, paragraph: &docx_rs::Paragraph) {
    push_paragraph_children(out, &paragraph.children);
    out.push('\n');
}

// Deleted and moved-away revisions are not part of the visible text.
fn push_paragraph_children(out: &mut String, children: &[docx_rs::ParagraphChild]) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_run(out, run),
            docx_rs::ParagraphChild::Hyperlink(link) => push_paragraph_children(out, &link.children),
            docx_rs::ParagraphChild::Insert(insert) => {
                for inserted in &insert.children {
                    if let docx_rs::InsertChild::Run(run) = inserted {
                        push_run(out, run);
                    }
                }
            }
            docx_rs::ParagraphChild::MoveTo(moved) => {
                for moved_child in &moved.children {
                    if let docx_rs::MoveToChild::Run(run) = moved_child {
                        push_run(out, run);
                    }
                }
            }
            docx_rs::ParagraphChild::StructuredDataTag(tag) => push_tag(out, tag),
            _ => {}
        }
    }
}

fn push_run(out: &mut String, run: &docx_rs::Run) {
    for run_child in &run.children {
        match run_child {
            docx_rs::RunChild::Text(t) => out.push_str(&t.text),
            docx_rs::RunChild::Tab(_) => out.push('\t'),
            docx_rs::RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

/// Detect the document kind and extract its text on the blocking pool.
///
/// Panics inside the parser surface as [`ExtractionError::Aborted`]; text that
/// is empty after trimming is [`ExtractionError::NoReadableText`].
pub async fn extract_text(
    extractor: Arc<dyn TextExtractor>,
    bytes: Vec<u8>,
    declared_mime: Option<&str>,
    file_name: &str,
) -> Result<(DocumentKind, String), ExtractionError> {
    let kind = DocumentKind::detect(declared_mime, file_name, &bytes).ok_or_else(|| {
        ExtractionError::UnsupportedFormat(
            declared_mime
                .map(String::from)
                .unwrap_or_else(|| describe_unknown(file_name)),
        )
    })?;

    let task = tokio::task::spawn_blocking(move || extractor.extract(&bytes, kind));
    let text = match tokio::time::timeout(EXTRACTION_TIMEOUT, task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_error)) => return Err(ExtractionError::Aborted(join_error.to_string())),
        Err(_) => return Err(ExtractionError::Timeout(EXTRACTION_TIMEOUT.as_secs())),
    };

    let text = normalize_whitespace(&text);
    if text.is_empty() {
        return Err(ExtractionError::NoReadableText);
    }

    Ok((kind, text))
}

fn describe_unknown(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{}", ext.to_ascii_lowercase()),
        _ => "unknown type".to_string(),
    }
}

/// Trim every line and drop runs of blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }
    out
}

/// Write a DOCX in memory; only used to build fixtures.
#[cfg(test)]
pub(crate) fn docx_fixture(paragraphs: &[&str]) -> Vec<u8> {
    use docx_rs::{Docx, Paragraph, Run};

    let mut docx = Docx::new();
    for text in paragraphs {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
    }
    pack(docx)
}

#[cfg(test)]
fn pack(docx: docx_rs::Docx) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    docx.build().pack(&mut cursor).expect("pack docx fixture");
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_prefers_declared_mime() {
        assert_eq!(
            DocumentKind::detect(Some("application/pdf"), "cv.bin", b""),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::detect(Some(DOCX_MIME), "cv", b""), Some(DocumentKind::Docx));
    }

    #[test]
    fn test_detect_falls_back_to_extension_then_magic() {
        assert_eq!(
            DocumentKind::detect(Some("application/octet-stream"), "Jane.PDF", b""),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::detect(None, "download", b"%PDF-1.7\n"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::detect(None, "notes.txt", b"hello"), None);
        assert_eq!(DocumentKind::detect(Some("image/png"), "scan.png", b"\x89PNG"), None);
    }

    #[test]
    fn test_detect_zip_without_word_part_is_not_docx() {
        let xlsx_like = b"PK\x03\x04....xl/workbook.xml";
        assert_eq!(DocumentKind::detect(None, "file", xlsx_like), None);
    }

    #[test]
    fn test_docx_text_extracted() {
        let bytes = docx_fixture(&["Jane Doe", "Senior Rust Engineer"]);
        let text = DocumentExtractor.extract(&bytes, DocumentKind::Docx).unwrap();
        assert!(text.contains("Jane Doe"));
        assert!(text.contains("Senior Rust Engineer"));
        assert_eq!(DocumentKind::detect(None, "blob", &bytes), Some(DocumentKind::Docx));
    }

    #[test]
    fn test_docx_table_cells_extracted() {
        use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

        let cell = |text: &str| {
            TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
        };
        let table = Table::new(vec![
            TableRow::new(vec![cell("Jane Doe"), cell("Rust, PostgreSQL")]),
            TableRow::new(vec![cell("Acme Corp"), cell("2019 to 2024")]),
        ]);
        let bytes = pack(Docx::new().add_table(table));

        let text = DocumentExtractor.extract(&bytes, DocumentKind::Docx).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, ["Jane Doe", "Rust, PostgreSQL", "Acme Corp", "2019 to 2024"]);
    }

    #[test]
    fn test_docx_hyperlink_text_kept() {
        use docx_rs::{Docx, Hyperlink, HyperlinkType, Paragraph, Run};

        let link = Hyperlink::new("mailto:jane@example.com", HyperlinkType::External)
            .add_run(Run::new().add_text("jane@example.com"));
        let paragraph = Paragraph::new()
            .add_run(Run::new().add_text("Email: "))
            .add_hyperlink(link);
        let bytes = pack(Docx::new().add_paragraph(paragraph));

        let text = DocumentExtractor.extract(&bytes, DocumentKind::Docx).unwrap();
        assert!(text.trim().starts_with("Email:"));
        assert!(text.contains("jane@example.com"));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\n\n  b\n c  "), "a\n\nb\nc");
        assert_eq!(normalize_whitespace(" \n\t\n "), "");
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected_before_extraction() {
        let result = extract_text(
            Arc::new(DocumentExtractor),
            b"plain text".to_vec(),
            Some("text/plain"),
            "notes.txt",
        )
        .await;
        assert!(matches!(result, Err(ExtractionError::UnsupportedFormat(m)) if m == "text/plain"));
    }

    #[tokio::test]
    async fn test_blank_document_has_no_readable_text() {
        let bytes = docx_fixture(&["   ", ""]);
        let result = extract_text(Arc::new(DocumentExtractor), bytes, None, "blank.docx").await;
        assert!(matches!(result, Err(ExtractionError::NoReadableText)));
    }
}
