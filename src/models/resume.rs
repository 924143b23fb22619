use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job posting a bulk upload is scored against (read-only here).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobPosting {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub category: Option<String>,
    pub recruiter_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
}

impl JobPosting {
    /// Category tag stamped on every resume ingested for this posting.
    pub fn category_tag(&self) -> String {
        let slug = self
            .category
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if slug.is_empty() {
            "general".to_string()
        } else {
            slug
        }
    }
}

/// Candidate analysis returned by the resume-analysis prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ResumeAnalysis {
    #[garde(length(max = 200))]
    pub candidate_name: Option<String>,
    #[garde(length(max = 320))]
    pub email: Option<String>,
    #[garde(length(max = 64))]
    pub phone: Option<String>,
    #[garde(skip)]
    pub skills: Vec<String>,
    #[garde(range(min = 0.0, max = 80.0))]
    pub experience_years: Option<f64>,
    #[garde(skip)]
    pub education: Option<String>,
    #[garde(skip)]
    pub summary: Option<String>,
    #[garde(range(min = 0, max = 100))]
    pub match_score: u8,
    #[garde(skip)]
    pub strengths: Vec<String>,
    #[garde(skip)]
    pub concerns: Vec<String>,
    #[garde(skip)]
    pub recommendation: Option<String>,
    /// Set when the AI response could not be parsed and defaults were used.
    #[garde(skip)]
    pub fallback: bool,
}

impl Default for ResumeAnalysis {
    fn default() -> Self {
        Self {
            candidate_name: None,
            email: None,
            phone: None,
            skills: Vec::new(),
            experience_years: None,
            education: None,
            summary: None,
            match_score: 0,
            strengths: Vec::new(),
            concerns: Vec::new(),
            recommendation: None,
            fallback: false,
        }
    }
}

/// ATS-style scoring returned by the ATS prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct AtsScore {
    #[garde(range(min = 0, max = 100))]
    pub ats_score: u8,
    #[garde(range(min = 0, max = 100))]
    pub keyword_match: u8,
    #[garde(range(min = 0, max = 100))]
    pub formatting_score: u8,
    #[garde(skip)]
    pub matched_keywords: Vec<String>,
    #[garde(skip)]
    pub missing_keywords: Vec<String>,
    #[garde(skip)]
    pub suggestions: Vec<String>,
    #[garde(skip)]
    pub fallback: bool,
}

impl Default for AtsScore {
    fn default() -> Self {
        Self {
            ats_score: 0,
            keyword_match: 0,
            formatting_score: 0,
            matched_keywords: Vec::new(),
            missing_keywords: Vec::new(),
            suggestions: Vec::new(),
            fallback: false,
        }
    }
}

/// A scored candidate record produced by successful item processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub bulk_job_id: Option<Uuid>,
    pub category: String,
    pub source_label: String,
    pub source_url: Option<String>,
    pub analysis: ResumeAnalysis,
    pub ats: AtsScore,
    pub needs_manual_review: bool,
    #[serde(skip_serializing)]
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(category: Option<&str>) -> JobPosting {
        JobPosting {
            id: Uuid::new_v4(),
            title: "Backend Engineer".to_string(),
            description: String::new(),
            requirements: Vec::new(),
            category: category.map(String::from),
            recruiter_id: None,
            manager_id: None,
        }
    }

    #[test]
    fn test_category_tag_slugifies() {
        assert_eq!(posting(Some("Software Engineering")).category_tag(), "software-engineering");
        assert_eq!(posting(Some("  Data / ML ")).category_tag(), "data-ml");
    }

    #[test]
    fn test_category_tag_defaults_to_general() {
        assert_eq!(posting(None).category_tag(), "general");
        assert_eq!(posting(Some(" - ")).category_tag(), "general");
    }

    #[test]
    fn test_analysis_score_range_validated() {
        let analysis: ResumeAnalysis =
            serde_json::from_str(r#"{"match_score": 101}"#).unwrap();
        assert!(analysis.validate().is_err());

        let analysis: ResumeAnalysis =
            serde_json::from_str(r#"{"match_score": 72, "skills": ["rust"]}"#).unwrap();
        assert!(analysis.validate().is_ok());
        assert_eq!(analysis.skills, vec!["rust"]);
    }
}
