use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::resume::{JobPosting, ResumeRecord};

#[derive(Debug, sqlx::FromRow)]
struct ResumeRow {
    id: Uuid,
    job_posting_id: Uuid,
    bulk_job_id: Option<Uuid>,
    category: String,
    source_label: String,
    source_url: Option<String>,
    analysis: serde_json::Value,
    ats: serde_json::Value,
    needs_manual_review: bool,
    raw_text: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResumeRow> for ResumeRecord {
    type Error = StoreError;

    fn try_from(row: ResumeRow) -> Result<Self, Self::Error> {
        Ok(ResumeRecord {
            id: row.id,
            job_posting_id: row.job_posting_id,
            bulk_job_id: row.bulk_job_id,
            category: row.category,
            source_label: row.source_label,
            source_url: row.source_url,
            analysis: serde_json::from_value(row.analysis)?,
            ats: serde_json::from_value(row.ats)?,
            needs_manual_review: row.needs_manual_review,
            raw_text: row.raw_text,
            created_at: row.created_at,
        })
    }
}

/// Look up a job posting
pub async fn get_job_posting(
    pool: &PgPool,
    posting_id: Uuid,
) -> Result<Option<JobPosting>, sqlx::Error> {
    sqlx::query_as::<_, JobPosting>(
        r#"
        SELECT id, title, description, requirements, category, recruiter_id, manager_id
        FROM job_postings
        WHERE id = $1
        "#,
    )
    .bind(posting_id)
    .fetch_optional(pool)
    .await
}

/// Insert a scored resume
pub async fn insert_resume(pool: &PgPool, resume: &ResumeRecord) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO resumes
            (id, job_posting_id, bulk_job_id, category, source_label, source_url,
             candidate_name, email, match_score, ats_score, analysis, ats,
             needs_manual_review, raw_text, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(resume.id)
    .bind(resume.job_posting_id)
    .bind(resume.bulk_job_id)
    .bind(&resume.category)
    .bind(&resume.source_label)
    .bind(&resume.source_url)
    .bind(&resume.analysis.candidate_name)
    .bind(&resume.analysis.email)
    .bind(i16::from(resume.analysis.match_score))
    .bind(i16::from(resume.ats.ats_score))
    .bind(serde_json::to_value(&resume.analysis)?)
    .bind(serde_json::to_value(&resume.ats)?)
    .bind(resume.needs_manual_review)
    .bind(&resume.raw_text)
    .bind(resume.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch resumes by id, in the order requested
pub async fn get_resumes(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<ResumeRecord>, StoreError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<ResumeRow> = sqlx::query_as(
        r#"
        SELECT id, job_posting_id, bulk_job_id, category, source_label, source_url,
               analysis, ats, needs_manual_review, raw_text, created_at
        FROM resumes
        WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut by_id: HashMap<Uuid, ResumeRecord> = rows
        .into_iter()
        .map(|row| ResumeRecord::try_from(row).map(|r| (r.id, r)))
        .collect::<Result<_, _>>()?;

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}
