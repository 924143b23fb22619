//! AI scoring of extracted resume text against a job posting.

use async_trait::async_trait;
use garde::Validate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::models::resume::{AtsScore, JobPosting, ResumeAnalysis};

const DEFAULT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";
const MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Resume text beyond this many characters is not sent to the model.
const MAX_RESUME_CHARS: usize = 12_000;

pub const FALLBACK_SCORE: u8 = 50;
pub const FALLBACK_CONCERN: &str = "AI response could not be parsed; manual review required";

/// A generative text service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<String, ScorerError>;
}

/// Cloudflare Workers AI text generation client.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Deserialize)]
struct WorkersAiResponse {
    #[serde(default)]
    success: bool,
    result: Option<WorkersAiResult>,
    #[serde(default)]
    errors: Vec<WorkersAiMessage>,
}

#[derive(Deserialize)]
struct WorkersAiResult {
    response: Option<String>,
}

#[derive(Deserialize)]
struct WorkersAiMessage {
    message: String,
}

impl WorkersAiClient {
    pub fn new(
        account_id: &str,
        api_token: &str,
        model: Option<&str>,
    ) -> Result<Self, ScorerError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ScorerError::Http)?;

        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for WorkersAiClient {
    async fn generate_content(&self, prompt: &str) -> Result<String, ScorerError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        );

        let request_body = serde_json::json!({
            "prompt": prompt,
            "max_tokens": MAX_TOKENS
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(ScorerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScorerError::Api {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        let parsed: WorkersAiResponse = response.json().await.map_err(ScorerError::Http)?;
        if !parsed.success {
            let message = parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ScorerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        parsed
            .result
            .and_then(|r| r.response)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ScorerError::EmptyResponse)
    }
}

/// Which question is asked of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PromptKind {
    ResumeAnalysis,
    AtsScore,
}

/// Parsed model output for one [`PromptKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScoredResponse {
    Analysis(ResumeAnalysis),
    Ats(AtsScore),
}

/// Wraps a [`TextGenerator`] with prompt building, tolerant JSON parsing and a
/// process-wide concurrency cap.
#[derive(Clone)]
pub struct ScorerAdapter {
    generator: Option<Arc<dyn TextGenerator>>,
    permits: Arc<Semaphore>,
}

impl ScorerAdapter {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, max_concurrency: usize) -> Self {
        Self {
            generator,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    pub fn ensure_configured(&self) -> Result<(), ScorerError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(ScorerError::NotConfigured)
        }
    }

    /// Ask one question about `resume_text`. Transport failures are errors;
    /// unparseable answers come back as the labelled fallback.
    pub async fn invoke(
        &self,
        kind: PromptKind,
        resume_text: &str,
        posting: &JobPosting,
    ) -> Result<ScoredResponse, ScorerError> {
        let generator = self.generator.as_ref().ok_or(ScorerError::NotConfigured)?;
        let prompt = build_prompt(kind, resume_text, posting);

        let raw = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| ScorerError::Closed)?;
            let start = Instant::now();
            let raw = generator.generate_content(&prompt).await;
            metrics::histogram!("scorer_request_seconds", "prompt" => kind.to_string())
                .record(start.elapsed().as_secs_f64());
            raw?
        };

        let response = match kind {
            PromptKind::ResumeAnalysis => {
                ScoredResponse::Analysis(parse_or_fallback(kind, &raw, analysis_fallback))
            }
            PromptKind::AtsScore => ScoredResponse::Ats(parse_or_fallback(kind, &raw, ats_fallback)),
        };
        Ok(response)
    }

    pub async fn analyze(
        &self,
        resume_text: &str,
        posting: &JobPosting,
    ) -> Result<ResumeAnalysis, ScorerError> {
        match self.invoke(PromptKind::ResumeAnalysis, resume_text, posting).await? {
            ScoredResponse::Analysis(analysis) => Ok(analysis),
            ScoredResponse::Ats(_) => Ok(analysis_fallback()),
        }
    }

    pub async fn score_ats(
        &self,
        resume_text: &str,
        posting: &JobPosting,
    ) -> Result<AtsScore, ScorerError> {
        match self.invoke(PromptKind::AtsScore, resume_text, posting).await? {
            ScoredResponse::Ats(ats) => Ok(ats),
            ScoredResponse::Analysis(_) => Ok(ats_fallback()),
        }
    }
}

fn parse_or_fallback<T>(kind: PromptKind, raw: &str, fallback: fn() -> T) -> T
where
    T: DeserializeOwned + Validate,
    <T as Validate>::Context: Default,
{
    match parse_response::<T>(raw) {
        Ok(value) => value,
        Err(reason) => {
            tracing::warn!(prompt = %kind, reason = %reason, "Falling back to default scores");
            metrics::counter!("scorer_fallbacks_total", "prompt" => kind.to_string()).increment(1);
            fallback()
        }
    }
}

/// Parse a model answer into `T`, tolerating code fences and chatter around
/// the JSON object.
pub fn parse_response<T>(raw: &str) -> Result<T, String>
where
    T: DeserializeOwned + Validate,
    <T as Validate>::Context: Default,
{
    let body = strip_json_fences(raw);
    let json = isolate_object(body).ok_or_else(|| "no JSON object in response".to_string())?;
    let value: T = serde_json::from_str(json).map_err(|e| e.to_string())?;
    value.validate().map_err(|e| e.to_string())?;
    Ok(value)
}

fn strip_json_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn isolate_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn analysis_fallback() -> ResumeAnalysis {
    ResumeAnalysis {
        match_score: FALLBACK_SCORE,
        concerns: vec![FALLBACK_CONCERN.to_string()],
        recommendation: Some("manual_review".to_string()),
        fallback: true,
        ..ResumeAnalysis::default()
    }
}

pub fn ats_fallback() -> AtsScore {
    AtsScore {
        ats_score: FALLBACK_SCORE,
        keyword_match: FALLBACK_SCORE,
        formatting_score: FALLBACK_SCORE,
        suggestions: vec![FALLBACK_CONCERN.to_string()],
        fallback: true,
        ..AtsScore::default()
    }
}

fn build_prompt(kind: PromptKind, resume_text: &str, posting: &JobPosting) -> String {
    let resume: String = resume_text.chars().take(MAX_RESUME_CHARS).collect();
    let requirements = if posting.requirements.is_empty() {
        "(none listed)".to_string()
    } else {
        posting.requirements.join("; ")
    };

    let task = match kind {
        PromptKind::ResumeAnalysis => concat!(
            "Analyze the resume below against the job posting. Return ONLY a JSON object with ",
            "these fields: candidate_name, email, phone, skills (array of strings), ",
            "experience_years (number), education, summary, match_score (integer 0-100), ",
            "strengths (array), concerns (array), recommendation ",
            "(one of strong_match, good_match, partial_match, weak_match)."
        ),
        PromptKind::AtsScore => concat!(
            "Score the resume below the way an applicant tracking system would for the job ",
            "posting. Return ONLY a JSON object with these fields: ats_score (integer 0-100), ",
            "keyword_match (integer 0-100), formatting_score (integer 0-100), ",
            "matched_keywords (array), missing_keywords (array), suggestions (array)."
        ),
    };

    format!(
        "{task}\n\nJOB TITLE: {}\nJOB DESCRIPTION:\n{}\nREQUIREMENTS: {}\n\nRESUME:\n{}",
        posting.title, posting.description, requirements, resume
    )
}

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("AI scoring is not configured")]
    NotConfigured,

    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("AI service returned an empty response")]
    EmptyResponse,

    #[error("AI scorer is shutting down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate_content(&self, _prompt: &str) -> Result<String, ScorerError> {
            Ok(self.0.to_string())
        }
    }

    fn posting() -> JobPosting {
        JobPosting {
            id: Uuid::new_v4(),
            title: "Rust Engineer".to_string(),
            description: "Build services".to_string(),
            requirements: vec!["Rust".to_string(), "Postgres".to_string()],
            category: None,
            recruiter_id: None,
            manager_id: None,
        }
    }

    #[test]
    fn test_fenced_json_with_chatter_parses() {
        let raw = "Sure! Here you go:\n```json\n{\"match_score\": 82, \"skills\": [\"Rust\"]}\n```";
        let parsed: ResumeAnalysis = parse_response(raw).unwrap();
        assert_eq!(parsed.match_score, 82);
        assert_eq!(parsed.skills, vec!["Rust".to_string()]);
        assert!(!parsed.fallback);
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let raw = r#"{"ats_score": 140, "keyword_match": 10, "formatting_score": 10}"#;
        assert!(parse_response::<AtsScore>(raw).is_err());
    }

    #[tokio::test]
    async fn test_unparseable_answer_falls_back() {
        let adapter = ScorerAdapter::new(Some(Arc::new(Canned("I cannot help with that"))), 2);
        let analysis = adapter.analyze("resume text", &posting()).await.unwrap();
        assert!(analysis.fallback);
        assert_eq!(analysis.match_score, FALLBACK_SCORE);
        assert_eq!(analysis.concerns, vec![FALLBACK_CONCERN.to_string()]);

        let ats = adapter.score_ats("resume text", &posting()).await.unwrap();
        assert!(ats.fallback);
        assert_eq!(ats.ats_score, FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn test_unconfigured_adapter_errors() {
        let adapter = ScorerAdapter::new(None, 1);
        assert!(!adapter.is_configured());
        assert!(matches!(adapter.ensure_configured(), Err(ScorerError::NotConfigured)));
        assert!(matches!(
            adapter.analyze("text", &posting()).await,
            Err(ScorerError::NotConfigured)
        ));
    }

    #[test]
    fn test_prompt_mentions_posting_and_truncates_resume() {
        let long = "x".repeat(MAX_RESUME_CHARS + 500);
        let prompt = build_prompt(PromptKind::AtsScore, &long, &posting());
        assert!(prompt.contains("Rust Engineer"));
        assert!(prompt.contains("Rust; Postgres"));
        assert!(prompt.len() < MAX_RESUME_CHARS + 1_000);
    }
}
