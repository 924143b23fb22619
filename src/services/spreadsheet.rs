//! Document links listed in an uploaded spreadsheet.

use calamine::Reader;
use regex::Regex;
use std::sync::LazyLock;

use crate::services::drive::{parse_drive_link, DriveTarget};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s"'<>|,;]+"#).unwrap());

/// A document link found in a spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetLink {
    Drive { target: DriveTarget, url: String },
    Direct { url: String },
}

impl SheetLink {
    pub fn url(&self) -> &str {
        match self {
            SheetLink::Drive { url, .. } | SheetLink::Direct { url } => url,
        }
    }

    /// Classify a URL; folders and pages that are not documents yield `None`.
    pub fn classify(url: &str) -> Option<Self> {
        let url = url.trim_end_matches(['.', ')', ']']);
        match parse_drive_link(url) {
            Some(DriveTarget::Folder(_)) => None,
            Some(target) => Some(SheetLink::Drive {
                target,
                url: url.to_string(),
            }),
            None if is_direct_document(url) => Some(SheetLink::Direct {
                url: url.to_string(),
            }),
            None => None,
        }
    }
}

fn is_direct_document(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.to_ascii_lowercase();
    path.ends_with(".pdf") || path.ends_with(".docx")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetFormat {
    Csv,
    Workbook,
    Text,
}

impl SheetFormat {
    fn detect(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> Self {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "tsv" => return SheetFormat::Csv,
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => return SheetFormat::Workbook,
            "txt" => return SheetFormat::Text,
            _ => {}
        }
        if content_type.contains("csv") {
            SheetFormat::Csv
        } else if content_type.contains("spreadsheet")
            || content_type.contains("excel")
            || bytes.starts_with(b"PK\x03\x04")
            || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
        {
            SheetFormat::Workbook
        } else {
            SheetFormat::Text
        }
    }
}

/// Every recognised document link in the file, in sheet, row, column order.
pub fn extract_links(
    file_name: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<Vec<SheetLink>, SpreadsheetError> {
    let cells = match SheetFormat::detect(file_name, content_type, bytes) {
        SheetFormat::Csv => csv_cells(bytes, file_name)?,
        SheetFormat::Workbook => workbook_cells(bytes)?,
        SheetFormat::Text => text_cells(bytes)?,
    };

    Ok(cells
        .iter()
        .flat_map(|cell| URL_RE.find_iter(cell))
        .filter_map(|m| SheetLink::classify(m.as_str()))
        .collect())
}

fn csv_cells(bytes: &[u8], file_name: &str) -> Result<Vec<String>, SpreadsheetError> {
    let delimiter = if file_name.to_ascii_lowercase().ends_with(".tsv") {
        b'\t'
    } else {
        b','
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SpreadsheetError::Unreadable(e.to_string()))?;
        cells.extend(record.iter().map(String::from));
    }
    Ok(cells)
}

fn workbook_cells(bytes: &[u8]) -> Result<Vec<String>, SpreadsheetError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| SpreadsheetError::Unreadable(e.to_string()))?;

    let mut cells = Vec::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(sheet = %sheet_name, error = %e, "Skipping unreadable sheet");
                continue;
            }
        };
        for row in range.rows() {
            cells.extend(row.iter().filter_map(|cell| match cell {
                calamine::Data::String(s) => Some(s.clone()),
                _ => None,
            }));
        }
    }
    Ok(cells)
}

fn text_cells(bytes: &[u8]) -> Result<Vec<String>, SpreadsheetError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| SpreadsheetError::Unreadable("file is not valid UTF-8 text".to_string()))?;
    Ok(text.split_whitespace().map(String::from).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum SpreadsheetError {
    #[error("Could not read spreadsheet: {0}")]
    Unreadable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
name,resume,notes
Jane Doe,https://drive.google.com/file/d/1JaneJaneJaneJane/view?usp=sharing,strong
John Roe,https://cdn.example.com/cvs/john-roe.PDF,not a link
Ann Lee,https://docs.google.com/document/d/1AnnAnnAnnAnnAnn/edit,https://example.com/about.html
";

    #[test]
    fn test_csv_links_in_row_order() {
        let links = extract_links("candidates.csv", Some("text/csv"), SHEET.as_bytes()).unwrap();
        assert_eq!(links.len(), 3);
        assert!(matches!(&links[0], SheetLink::Drive { target: DriveTarget::File(id), .. } if id == "1JaneJaneJaneJane"));
        assert_eq!(links[1].url(), "https://cdn.example.com/cvs/john-roe.PDF");
        assert!(matches!(&links[2], SheetLink::Drive { target: DriveTarget::Document(_), .. }));
    }

    #[test]
    fn test_plain_text_list() {
        let text = "https://drive.google.com/open?id=1OpenOpenOpenOpen\n\
                    https://drive.google.com/drive/folders/1FolderFolderFold\n\
                    see https://example.com/cv.docx.";
        let links = extract_links("links.txt", None, text.as_bytes()).unwrap();
        let urls: Vec<&str> = links.iter().map(SheetLink::url).collect();
        assert_eq!(
            urls,
            vec![
                "https://drive.google.com/open?id=1OpenOpenOpenOpen",
                "https://example.com/cv.docx"
            ]
        );
    }

    #[test]
    fn test_non_utf8_text_is_unreadable() {
        assert!(matches!(
            extract_links("links", Some("text/plain"), &[0xff, 0xfe, 0x00]),
            Err(SpreadsheetError::Unreadable(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SheetFormat::detect("a.xlsx", None, b""), SheetFormat::Workbook);
        assert_eq!(SheetFormat::detect("upload", Some("text/csv"), b""), SheetFormat::Csv);
        assert_eq!(SheetFormat::detect("upload", None, b"PK\x03\x04"), SheetFormat::Workbook);
        assert_eq!(SheetFormat::detect("upload", None, b"hello"), SheetFormat::Text);
    }
}
