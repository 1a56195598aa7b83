//! Run-wide deduplication by pmid.
//!
//! The first occurrence in aggregation order is kept; every later record with
//! the same pmid is returned as a duplicate candidate for abstract backfill.

use std::collections::HashSet;

use tracing::debug;

use crate::models::CitationRecord;

/// Records split into the persistable set and the duplicates seen.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Deduplicated {
    /// First occurrence of every pmid, in input order
    pub unique: Vec<CitationRecord>,
    /// Later occurrences, in input order
    pub duplicates: Vec<CitationRecord>,
}

/// Partition records by pmid, keeping the first occurrence.
#[must_use]
pub fn deduplicate(records: Vec<CitationRecord>) -> Deduplicated {
    let mut seen = HashSet::with_capacity(records.len());
    let mut result = Deduplicated {
        unique: Vec::with_capacity(records.len()),
        duplicates: Vec::new(),
    };

    for record in records {
        if seen.insert(record.pmid) {
            result.unique.push(record);
        } else {
            result.duplicates.push(record);
        }
    }

    debug!(
        unique = result.unique.len(),
        duplicates = result.duplicates.len(),
        "Deduplicated records"
    );
    result
}
