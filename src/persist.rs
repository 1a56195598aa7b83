//! Chunked, transactional persistence of the unique record set.

use tracing::{debug, error, info, warn};

use crate::error::{IngestError, Result};
use crate::models::CitationRecord;
use crate::report::RunReport;
use crate::repository::{CitationRepository, RowRejection};

/// Default number of records per transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Writes records in fixed-size chunks, one committed transaction per chunk.
#[derive(Debug, Clone, Copy)]
pub struct BatchPersister {
    chunk_size: usize,
}

impl Default for BatchPersister {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl BatchPersister {
    /// Create a persister; a zero chunk size is treated as one.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Configured chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Persist `records` and return the ones a store constraint rejected.
    ///
    /// A chunk that fails for any non-fatal reason is rolled back and written
    /// again row by row, skipping only the rows the store rejects. Conflicting
    /// rows are returned; unencodable rows are logged and counted. Only fatal
    /// store errors are returned as `Err`.
    pub fn persist<R: CitationRepository + ?Sized>(
        &self,
        repository: &R,
        records: &[CitationRecord],
        report: &mut RunReport,
    ) -> Result<Vec<CitationRecord>> {
        let mut conflicts = Vec::new();

        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            match repository.insert_records_chunk(chunk) {
                Ok(inserted) => {
                    report.records_persisted += inserted as u64;
                    report.chunks_committed += 1;
                    debug!(chunk = index, inserted, "Chunk committed");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    if err.is_constraint_violation() {
                        warn!(chunk = index, error = %err, "Chunk violated a constraint, retrying without conflicting rows");
                    } else {
                        warn!(chunk = index, error = %err, "Chunk failed, retrying row by row");
                    }
                    Self::retry_row_by_row(repository, index, chunk, report, &mut conflicts)?;
                }
            }
        }

        info!(
            persisted = report.records_persisted,
            conflicts = conflicts.len(),
            rejected = report.records_rejected,
            chunks = report.chunks_committed,
            "Persistence finished"
        );
        Ok(conflicts)
    }

    fn retry_row_by_row<R: CitationRepository + ?Sized>(
        repository: &R,
        index: usize,
        chunk: &[CitationRecord],
        report: &mut RunReport,
        conflicts: &mut Vec<CitationRecord>,
    ) -> Result<()> {
        match repository.insert_records_skipping_rejects(chunk) {
            Ok(rejected) => {
                for &(row, rejection) in &rejected {
                    let Some(record) = chunk.get(row) else {
                        continue;
                    };
                    match rejection {
                        RowRejection::Conflict => {
                            let conflict = IngestError::PersistenceConflict(format!("pmid {}", record.pmid));
                            debug!(chunk = index, %conflict, "Skipped conflicting row");
                            report.persistence_conflicts += 1;
                            conflicts.push(record.clone());
                        }
                        RowRejection::Unencodable => {
                            error!(chunk = index, pmid = record.pmid, "Skipped row the store cannot encode");
                            report.records_rejected += 1;
                        }
                    }
                }
                let inserted = chunk.len().saturating_sub(rejected.len());
                report.records_persisted += inserted as u64;
                report.chunks_committed += 1;
                warn!(chunk = index, inserted, skipped = rejected.len(), "Chunk committed without rejected rows");
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                error!(chunk = index, records = chunk.len(), error = %err, "Chunk retry failed");
                report.chunks_failed += 1;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockCitationRepository;
    use chrono::NaiveDate;

    fn record(pmid: u64) -> CitationRecord {
        CitationRecord {
            pmid,
            journal: Some("Nature".to_string()),
            pubdate: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap_or_default(),
            volume: None,
            issue: None,
            title: None,
            abstract_text: None,
            page: None,
            author: None,
            language: None,
            source_id: 1,
        }
    }

    fn constraint_error() -> IngestError {
        IngestError::PersistenceConflict("UNIQUE constraint failed: citation.pmid".into())
    }

    #[test]
    fn test_chunks_are_sized() {
        let mut repo = MockCitationRepository::new();
        repo.expect_insert_records_chunk()
            .times(3)
            .returning(|chunk| {
                assert!(chunk.len() <= 2);
                Ok(chunk.len())
            });

        let records: Vec<_> = (1..=5).map(record).collect();
        let mut report = RunReport::new();
        let conflicts = BatchPersister::new(2)
            .persist(&repo, &records, &mut report)
            .expect("persist");

        assert!(conflicts.is_empty());
        assert_eq!(report.records_persisted, 5);
        assert_eq!(report.chunks_committed, 3);
        assert!(report.is_complete());
    }

    #[test]
    fn test_conflicting_rows_are_skipped_and_returned() {
        let mut repo = MockCitationRepository::new();
        repo.expect_insert_records_chunk()
            .times(1)
            .returning(|_| Err(constraint_error()));
        repo.expect_insert_records_skipping_rejects()
            .times(1)
            .returning(|_| Ok(vec![(1, RowRejection::Conflict)]));

        let records = vec![record(10), record(11), record(12)];
        let mut report = RunReport::new();
        let conflicts = BatchPersister::default()
            .persist(&repo, &records, &mut report)
            .expect("persist");

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].pmid, 11);
        assert_eq!(report.records_persisted, 2);
        assert_eq!(report.persistence_conflicts, 1);
        assert_eq!(report.chunks_committed, 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_failed_chunk_does_not_stop_later_chunks() {
        let mut repo = MockCitationRepository::new();
        let mut calls = 0;
        repo.expect_insert_records_chunk()
            .times(2)
            .returning(move |chunk| {
                calls += 1;
                if calls == 1 {
                    Err(IngestError::Io(std::io::Error::other("disk full")))
                } else {
                    Ok(chunk.len())
                }
            });
        repo.expect_insert_records_skipping_rejects()
            .times(1)
            .returning(|_| Err(IngestError::Io(std::io::Error::other("disk full"))));

        let records: Vec<_> = (1..=4).map(record).collect();
        let mut report = RunReport::new();
        BatchPersister::new(2)
            .persist(&repo, &records, &mut report)
            .expect("persist");

        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.chunks_committed, 1);
        assert_eq!(report.records_persisted, 2);
    }

    #[test]
    fn test_unencodable_row_does_not_sink_its_chunk() {
        let mut repo = MockCitationRepository::new();
        repo.expect_insert_records_chunk()
            .times(1)
            .returning(|_| Err(IngestError::Io(std::io::Error::other("integer out of range"))));
        repo.expect_insert_records_skipping_rejects()
            .withf(|chunk| chunk.len() == 3)
            .times(1)
            .returning(|_| Ok(vec![(2, RowRejection::Unencodable)]));

        let records = vec![record(1), record(2), record(u64::MAX)];
        let mut report = RunReport::new();
        let conflicts = BatchPersister::default()
            .persist(&repo, &records, &mut report)
            .expect("persist");

        assert!(conflicts.is_empty());
        assert_eq!(report.records_persisted, 2);
        assert_eq!(report.records_rejected, 1);
        assert_eq!(report.chunks_committed, 1);
        assert_eq!(report.chunks_failed, 0);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_store_unavailable_aborts() {
        let mut repo = MockCitationRepository::new();
        repo.expect_insert_records_chunk()
            .times(1)
            .returning(|_| Err(IngestError::StoreUnavailable("locked".into())));

        let records = vec![record(1), record(2)];
        let err = BatchPersister::new(1)
            .persist(&repo, &records, &mut RunReport::new())
            .expect_err("fatal");
        assert!(err.is_fatal());
    }
}
