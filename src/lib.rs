//! Bulk resume ingestion service.
//!
//! Recruiters and hiring managers submit many resumes against one job posting
//! (a batch of files, a shared Google Drive link, or a spreadsheet of links).
//! The API stages the upload and queues a job; the worker extracts each
//! document's text, scores it with Cloudflare Workers AI, and records progress
//! that clients poll.

pub mod app_state;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod services;
