//! PubMed Parser - MEDLINE citation extraction and storage
//!
//! A Rust library for turning PubMed/MEDLINE XML baseline and update files into
//! a deduplicated relational citation store.
//!
//! # Features
//!
//! - Streaming extraction of `PubmedArticle` records from `.xml` and `.xml.gz` files
//! - Bounded parallel extraction with a single aggregating consumer
//! - Idempotent reprocessing keyed by file checksum and size
//! - Run-wide deduplication by pmid with abstract backfill
//! - Chunked transactional persistence to SQLite
//! - JSON and CSV export

/// Abstract backfill from duplicate records
pub mod backfill;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Run-wide deduplication
pub mod dedup;
/// Error types
pub mod error;
/// Citation field extraction
pub mod extractor;
/// Record export to JSON and CSV
pub mod file_writer;
/// Source file gating
pub mod gate;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Chunked persistence
pub mod persist;
/// Per-run counters
pub mod report;
/// Repository pattern for data access
pub mod repository;
/// Database schema definitions
pub mod schema;
/// Pipeline orchestration
pub mod service;
/// Input validation
pub mod validation;
/// Extraction worker pool
pub mod worker;
/// Streaming XML article reader
pub mod xml;

// Re-export key components for easier access
pub use db::Database;
pub use error::{IngestError, Result};
pub use models::{CitationRecord, InvalidPmidPolicy, OutputFormat, SourceFile};
pub use report::RunReport;
pub use repository::CitationRepository;
pub use service::{IngestOptions, IngestService};
