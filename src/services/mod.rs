pub mod auth;
pub mod drive;
pub mod encryption;
pub mod extractor;
pub mod fetch;
pub mod processor;
pub mod queue;
pub mod scorer;
pub mod sources;
pub mod spreadsheet;
pub mod storage;
pub mod tracker;
