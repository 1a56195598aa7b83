//! Fills null abstracts of persisted citations from duplicate records.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::CitationRecord;
use crate::report::RunReport;
use crate::repository::CitationRepository;

/// Merges abstracts from duplicates into already committed rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillMerger;

impl BackfillMerger {
    /// Backfill from `duplicates`, returning the number of rows updated.
    ///
    /// Must run after the unique set is committed. Duplicates without an
    /// abstract or a real pmid, and targets whose abstract is already set, are
    /// skipped silently.
    pub fn merge<R: CitationRepository + ?Sized>(
        repository: &R,
        duplicates: &[CitationRecord],
        report: &mut RunReport,
    ) -> Result<u64> {
        let mut backfilled = 0;

        for duplicate in duplicates {
            let Some(abstract_text) = duplicate.non_empty_abstract() else {
                continue;
            };
            if !duplicate.has_valid_pmid() {
                continue;
            }

            match Self::fill(repository, duplicate.pmid, abstract_text) {
                Ok(true) => {
                    backfilled += 1;
                    debug!(pmid = duplicate.pmid, "Abstract backfilled");
                }
                Ok(false) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(pmid = duplicate.pmid, error = %err, "Backfill failed"),
            }
        }

        report.records_backfilled += backfilled;
        info!(candidates = duplicates.len(), backfilled, "Backfill finished");
        Ok(backfilled)
    }

    fn fill<R: CitationRepository + ?Sized>(repository: &R, pmid: u64, abstract_text: &str) -> Result<bool> {
        match repository.find_null_abstract_by_pmid(pmid)? {
            Some(citation_id) => repository.update_abstract(citation_id, abstract_text),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::repository::MockCitationRepository;
    use chrono::NaiveDate;
    use mockall::predicate::eq;

    fn duplicate(pmid: u64, abstract_text: Option<&str>) -> CitationRecord {
        CitationRecord {
            pmid,
            journal: None,
            pubdate: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
            volume: None,
            issue: None,
            title: None,
            abstract_text: abstract_text.map(str::to_string),
            page: None,
            author: None,
            language: None,
            source_id: 2,
        }
    }

    #[test]
    fn test_null_abstract_is_filled() {
        let mut repo = MockCitationRepository::new();
        repo.expect_find_null_abstract_by_pmid()
            .with(eq(100))
            .times(1)
            .returning(|_| Ok(Some(7)));
        repo.expect_update_abstract()
            .withf(|id, text| *id == 7 && text == "X")
            .times(1)
            .returning(|_, _| Ok(true));

        let mut report = RunReport::new();
        let count = BackfillMerger::merge(&repo, &[duplicate(100, Some("X"))], &mut report).expect("merge");
        assert_eq!(count, 1);
        assert_eq!(report.records_backfilled, 1);
    }

    #[test]
    fn test_unusable_duplicates_are_skipped() {
        let mut repo = MockCitationRepository::new();
        repo.expect_find_null_abstract_by_pmid().times(0);
        repo.expect_update_abstract().times(0);

        let duplicates = [duplicate(5, None), duplicate(6, Some("")), duplicate(0, Some("orphan"))];
        let count = BackfillMerger::merge(&repo, &duplicates, &mut RunReport::new()).expect("merge");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_target_with_abstract_is_left_alone() {
        let mut repo = MockCitationRepository::new();
        repo.expect_find_null_abstract_by_pmid().returning(|_| Ok(None));
        repo.expect_update_abstract().times(0);

        let count =
            BackfillMerger::merge(&repo, &[duplicate(42, Some("late"))], &mut RunReport::new()).expect("merge");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_only_first_duplicate_fills() {
        let mut repo = MockCitationRepository::new();
        let mut filled = false;
        repo.expect_find_null_abstract_by_pmid()
            .times(2)
            .returning(move |_| {
                let found = if filled { None } else { Some(9) };
                filled = true;
                Ok(found)
            });
        repo.expect_update_abstract().times(1).returning(|_, _| Ok(true));

        let duplicates = [duplicate(42, Some("first")), duplicate(42, Some("second"))];
        let count = BackfillMerger::merge(&repo, &duplicates, &mut RunReport::new()).expect("merge");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_fatal_error_aborts() {
        let mut repo = MockCitationRepository::new();
        repo.expect_find_null_abstract_by_pmid()
            .returning(|_| Err(IngestError::StoreUnavailable("gone".into())));

        let result = BackfillMerger::merge(&repo, &[duplicate(1, Some("a"))], &mut RunReport::new());
        assert!(result.is_err());
    }
}
