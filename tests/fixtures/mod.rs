//! Documents and canned model answers used across the test suites.

/// A resume fixture: file name, declared content type, and raw bytes.
#[derive(Debug, Clone)]
pub struct ResumeFixture {
    pub file_name: &'static str,
    pub content_type: Option<&'static str>,
    pub bytes: Vec<u8>,
}

/// Fake PDFs carry their text after the magic header; the test extractor
/// strips the header and returns the rest.
pub const PDF_HEADER: &[u8] = b"%PDF-1.4\n";

pub fn pdf(file_name: &'static str, text: &str) -> ResumeFixture {
    let mut bytes = PDF_HEADER.to_vec();
    bytes.extend_from_slice(text.as_bytes());
    ResumeFixture {
        file_name,
        content_type: Some("application/pdf"),
        bytes,
    }
}

pub fn png(file_name: &'static str) -> ResumeFixture {
    ResumeFixture {
        file_name,
        content_type: Some("image/png"),
        bytes: b"\x89PNG\r\n\x1a\nnot a resume".to_vec(),
    }
}

pub const JANE_DOE: &str = "\
Jane Doe
jane.doe@example.com | +1 555 0100
Senior Backend Engineer, 7 years
Skills: Rust, PostgreSQL, Redis, Kubernetes
Experience: Built payment ledger services handling 20k requests/s.";

pub const JOHN_ROE: &str = "\
John Roe
john@example.org
Data engineer with Python, Airflow and Spark.";

pub const ANALYSIS_ANSWER: &str = r#"Here is the analysis:
```json
{
  "candidate_name": "Jane Doe",
  "email": "jane.doe@example.com",
  "phone": "+1 555 0100",
  "skills": ["Rust", "PostgreSQL", "Redis"],
  "experience_years": 7,
  "education": "BSc Computer Science",
  "summary": "Backend engineer focused on high-throughput services.",
  "match_score": 86,
  "strengths": ["Rust", "Distributed systems"],
  "concerns": [],
  "recommendation": "strong_match"
}
```"#;

pub const ATS_ANSWER: &str = r#"{"ats_score": 78, "keyword_match": 81, "formatting_score": 70,
"matched_keywords": ["Rust", "PostgreSQL"], "missing_keywords": ["gRPC"],
"suggestions": ["Quantify impact in the summary"]}"#;

/// Spreadsheet with three document links and two cells that are not links.
pub const LINK_SHEET_CSV: &str = "\
candidate,resume
Jane Doe,https://drive.google.com/file/d/1JaneDoeResumeFile/view?usp=sharing
John Roe,https://files.example.com/resumes/john-roe.pdf
Ann Lee,https://docs.google.com/document/d/1AnnLeeResumeDocId/edit
Sam Poe,see attached
Kim Ito,https://example.com/portfolio
";
