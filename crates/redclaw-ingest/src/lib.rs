//! # RedClaw Ingest
//!
//! Everything that pulls content into the knowledge base: RSS feeds,
//! uploaded files, and the report generator that summarizes what came in.

pub mod files;
pub mod report;
pub mod rss;

pub use files::FileParser;
pub use report::ReportGenerator;
pub use rss::{FeedRun, IngestSummary, RssFetcher};
