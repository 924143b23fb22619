use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::db::{ResumeStore, StoreError};
use crate::models::resume::{JobPosting, ResumeRecord};
use crate::services::extractor::{self, ExtractionError, TextExtractor};
use crate::services::scorer::{ScorerAdapter, ScorerError};
use crate::services::sources::{SourceError, SourceItem, SourceResolver};

/// Turns one source item into a persisted, scored resume record.
pub struct ItemProcessor {
    sources: Arc<SourceResolver>,
    extractor: Arc<dyn TextExtractor>,
    scorer: ScorerAdapter,
    resumes: Arc<dyn ResumeStore>,
}

impl ItemProcessor {
    pub fn new(
        sources: Arc<SourceResolver>,
        extractor: Arc<dyn TextExtractor>,
        scorer: ScorerAdapter,
        resumes: Arc<dyn ResumeStore>,
    ) -> Self {
        Self {
            sources,
            extractor,
            scorer,
            resumes,
        }
    }

    /// Process one item. Every failure is returned as a [`ProcessingError`]
    /// so the caller can log it against the item and move on.
    pub async fn process(
        &self,
        job_id: Uuid,
        item: &SourceItem,
        posting: &JobPosting,
    ) -> Result<ResumeRecord, ProcessingError> {
        let start = Instant::now();
        let result = self.process_inner(job_id, item, posting).await;

        let outcome = if result.is_ok() { "success" } else { "failed" };
        metrics::counter!("bulk_upload_items_total", "outcome" => outcome).increment(1);
        metrics::histogram!("bulk_upload_item_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(record) => tracing::info!(
                job_id = %job_id,
                item = %item.label(),
                resume_id = %record.id,
                match_score = record.analysis.match_score,
                ats_score = record.ats.ats_score,
                needs_manual_review = record.needs_manual_review,
                duration_ms = start.elapsed().as_millis() as u64,
                "Item processed"
            ),
            Err(e) => tracing::warn!(
                job_id = %job_id,
                item = %item.label(),
                error = %e,
                "Item failed"
            ),
        }
        result
    }

    async fn process_inner(
        &self,
        job_id: Uuid,
        item: &SourceItem,
        posting: &JobPosting,
    ) -> Result<ResumeRecord, ProcessingError> {
        let content = self.sources.load(item).await?;
        tracing::debug!(
            job_id = %job_id,
            item = %item.label(),
            bytes = content.bytes.len(),
            "Fetched item"
        );

        let (_, text) = extractor::extract_text(
            self.extractor.clone(),
            content.bytes,
            content.content_type.as_deref(),
            &content.file_name,
        )
        .await?;

        let (analysis, ats) = tokio::try_join!(
            self.scorer.analyze(&text, posting),
            self.scorer.score_ats(&text, posting),
        )?;

        let record = ResumeRecord {
            id: Uuid::new_v4(),
            job_posting_id: posting.id,
            bulk_job_id: Some(job_id),
            category: posting.category_tag(),
            source_label: item.label(),
            source_url: item.source_url(),
            needs_manual_review: analysis.fallback || ats.fallback,
            analysis,
            ats,
            raw_text: text,
            created_at: Utc::now(),
        };

        self.resumes.insert_resume(&record).await?;
        Ok(record)
    }
}

/// Why a single item could not be turned into a resume record.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("AI scoring failed: {0}")]
    Scoring(#[from] ScorerError),

    #[error("Failed to save resume: {0}")]
    Store(#[from] StoreError),
}
