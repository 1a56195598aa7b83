//! Per-run counters, handed explicitly to every pipeline stage.

use serde::Serialize;
use tracing::{info, warn};

use crate::extractor::FileExtraction;

/// Counts collected over one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Files that were gated in and extracted
    pub files_processed: u64,
    /// Files skipped because they were unchanged since the last run
    pub files_already_parsed: u64,
    /// Files skipped because they could not be decompressed or parsed
    pub files_unparsable: u64,
    /// Records extracted before deduplication
    pub raw_records: u64,
    /// Unique records written to the store
    pub records_persisted: u64,
    /// Later occurrences of an already seen pmid
    pub duplicates_seen: u64,
    /// Null abstracts filled from a duplicate
    pub records_backfilled: u64,
    /// Articles that recorded at least one field defect
    pub defective_articles: u64,
    /// Publication dates built through the fallback chain
    pub date_fallbacks: u64,
    /// Records excluded for lacking a pmid
    pub invalid_pmids_dropped: u64,
    /// Records rejected by a store constraint
    pub persistence_conflicts: u64,
    /// Records skipped because the store could not encode them
    pub records_rejected: u64,
    /// Chunks committed by the persister
    pub chunks_committed: u64,
    /// Chunks rolled back for a reason other than a constraint
    pub chunks_failed: u64,
}

impl RunReport {
    /// Fresh report for a new run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file's extraction counts in.
    pub fn record_file(&mut self, extraction: &FileExtraction) {
        self.files_processed += 1;
        self.raw_records += extraction.records.len() as u64;
        self.defective_articles += extraction.defective_articles as u64;
        self.date_fallbacks += extraction.date_fallbacks as u64;
        self.invalid_pmids_dropped += extraction.dropped as u64;
    }

    /// Whether nothing was skipped or rejected during the run.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.files_unparsable == 0
            && self.persistence_conflicts == 0
            && self.records_rejected == 0
            && self.chunks_failed == 0
    }

    /// Emit the end-of-run summary.
    pub fn log_summary(&self) {
        if self.is_complete() {
            info!(
                files_processed = self.files_processed,
                files_already_parsed = self.files_already_parsed,
                raw_records = self.raw_records,
                records_persisted = self.records_persisted,
                duplicates_seen = self.duplicates_seen,
                records_backfilled = self.records_backfilled,
                "Run complete"
            );
        } else {
            warn!(
                files_processed = self.files_processed,
                files_already_parsed = self.files_already_parsed,
                files_unparsable = self.files_unparsable,
                raw_records = self.raw_records,
                records_persisted = self.records_persisted,
                duplicates_seen = self.duplicates_seen,
                records_backfilled = self.records_backfilled,
                persistence_conflicts = self.persistence_conflicts,
                records_rejected = self.records_rejected,
                chunks_failed = self.chunks_failed,
                "Run partially complete"
            );
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.is_complete() { "complete" } else { "PARTIAL" };
        writeln!(f, "Run {status}")?;
        writeln!(f, "  files processed:        {}", self.files_processed)?;
        writeln!(f, "  files already parsed:   {}", self.files_already_parsed)?;
        writeln!(f, "  files unparsable:       {}", self.files_unparsable)?;
        writeln!(f, "  raw records:            {}", self.raw_records)?;
        writeln!(f, "  records persisted:      {}", self.records_persisted)?;
        writeln!(f, "  duplicates seen:        {}", self.duplicates_seen)?;
        writeln!(f, "  records backfilled:     {}", self.records_backfilled)?;
        writeln!(f, "  defective articles:     {}", self.defective_articles)?;
        writeln!(f, "  date fallbacks:         {}", self.date_fallbacks)?;
        writeln!(f, "  invalid pmids dropped:  {}", self.invalid_pmids_dropped)?;
        writeln!(f, "  persistence conflicts:  {}", self.persistence_conflicts)?;
        writeln!(f, "  records rejected:       {}", self.records_rejected)?;
        writeln!(f, "  chunks committed:       {}", self.chunks_committed)?;
        write!(f, "  chunks failed:          {}", self.chunks_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_when_files_or_rows_were_lost() {
        let mut report = RunReport::new();
        assert!(report.is_complete());

        report.files_already_parsed = 3;
        assert!(report.is_complete());

        report.files_unparsable = 1;
        assert!(!report.is_complete());
        assert!(report.to_string().starts_with("Run PARTIAL"));

        let conflicted = RunReport {
            persistence_conflicts: 2,
            ..RunReport::default()
        };
        assert!(!conflicted.is_complete());
    }

    #[test]
    fn test_record_file_accumulates() {
        let extraction = FileExtraction {
            articles: 4,
            defective_articles: 2,
            date_fallbacks: 1,
            invalid_pmids: 1,
            dropped: 1,
            ..FileExtraction::default()
        };
        let mut report = RunReport::new();
        report.record_file(&extraction);
        report.record_file(&extraction);
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.defective_articles, 4);
        assert_eq!(report.date_fallbacks, 2);
        assert_eq!(report.invalid_pmids_dropped, 2);
        assert_eq!(report.raw_records, 0);
    }
}
