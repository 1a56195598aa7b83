//! Repository pattern for the citation store write path.
//!
//! The pipeline stages only talk to the store through [`CitationRepository`],
//! which keeps them testable against a mock and keeps SQL in `db.rs`.

use crate::error::Result;
use crate::models::{CitationRecord, NewSourceFile, SourceFile};

/// Why a row was left out of a row-by-row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    /// A store constraint rejected the row, usually an already stored pmid
    Conflict,
    /// A field could not be bound as an SQLite value
    Unencodable,
}

/// Write-path operations the ingestion pipeline needs from the store.
#[cfg_attr(test, mockall::automock)]
pub trait CitationRepository: Send + Sync {
    /// Look up the source file row with the given file name.
    fn find_source_file(&self, name: &str) -> Result<Option<SourceFile>>;

    /// Number of citation rows referencing the source file.
    fn count_records_for_source(&self, source_id: i64) -> Result<u64>;

    /// Create the source file row, replacing (and cascading) any row with the same name.
    fn upsert_source_file(&self, source: &NewSourceFile) -> Result<SourceFile>;

    /// Insert all records in one transaction; any failure rolls the whole chunk back.
    fn insert_records_chunk(&self, records: &[CitationRecord]) -> Result<usize>;

    /// Insert records row by row in one transaction, skipping rows the store
    /// rejects on their own.
    ///
    /// Returns the indices (into `records`) of the skipped rows and why each was
    /// skipped. Errors not tied to a single row still fail the whole call.
    fn insert_records_skipping_rejects(&self, records: &[CitationRecord]) -> Result<Vec<(usize, RowRejection)>>;

    /// Row id of the persisted citation with this pmid, if its abstract is null.
    fn find_null_abstract_by_pmid(&self, pmid: u64) -> Result<Option<i64>>;

    /// Set the abstract of a citation whose abstract is still null.
    ///
    /// Returns `false` when the row no longer qualifies.
    fn update_abstract(&self, citation_id: i64, abstract_text: &str) -> Result<bool>;
}
