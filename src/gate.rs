//! Source gate: decides whether an input file must be (re)parsed.
//!
//! A file is skipped with [`IngestError::AlreadyParsed`] only when its stored
//! row has the same checksum, was not smaller than the file is now, still has
//! citations referencing it, and the run is not forced. In every other case the
//! prior row (and through it the prior citations) is replaced before extraction
//! starts, so persisted records always point at a row of the current run.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::models::{NewSourceFile, SourceFile};
use crate::repository::CitationRepository;

/// Why a previously seen file is parsed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseReason {
    /// Contents differ from the stored checksum
    ChecksumChanged,
    /// File is larger than when it was stored
    Grown,
    /// No citation references the stored row
    NoRecords,
    /// The run was forced
    Forced,
}

impl fmt::Display for ReparseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ChecksumChanged => "checksum changed",
            Self::Grown => "file grew",
            Self::NoRecords => "no records stored",
            Self::Forced => "forced",
        };
        f.write_str(reason)
    }
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First time this file name is seen
    New,
    /// The prior row was replaced
    Reparse(ReparseReason),
}

/// Compute name, checksum, size and absolute path of an input file.
pub fn fingerprint(path: &Path) -> Result<NewSourceFile> {
    let absolute = fs::canonicalize(path)?;
    let name = absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| IngestError::InputUnavailable(format!("{} has no file name", path.display())))?;

    let mut reader = BufReader::new(File::open(&absolute)?);
    let mut hasher = Sha256::new();
    let size = io::copy(&mut reader, &mut hasher)?;
    let checksum = hex::encode(hasher.finalize());
    debug!(name, checksum, size, "Fingerprinted input file");

    Ok(NewSourceFile {
        name,
        checksum,
        size,
        path: absolute.to_string_lossy().into_owned(),
    })
}

/// Gate in front of extraction, backed by the citation repository.
pub struct SourceGate<'a, R: CitationRepository + ?Sized> {
    repository: &'a R,
    force: bool,
}

impl<'a, R: CitationRepository + ?Sized> SourceGate<'a, R> {
    /// Create a gate; `force` reparses every file regardless of stored state.
    pub const fn new(repository: &'a R, force: bool) -> Self {
        Self { repository, force }
    }

    /// Decide whether the fingerprinted file has to be parsed.
    pub fn decide(&self, fingerprint: &NewSourceFile) -> Result<Admission> {
        let Some(prior) = self.repository.find_source_file(&fingerprint.name)? else {
            return Ok(Admission::New);
        };

        let reason = if self.force {
            Some(ReparseReason::Forced)
        } else if prior.checksum != fingerprint.checksum {
            Some(ReparseReason::ChecksumChanged)
        } else if prior.size < fingerprint.size {
            Some(ReparseReason::Grown)
        } else if self.repository.count_records_for_source(prior.id)? == 0 {
            Some(ReparseReason::NoRecords)
        } else {
            None
        };

        reason
            .map(Admission::Reparse)
            .ok_or_else(|| IngestError::AlreadyParsed(fingerprint.name.clone()))
    }

    /// Decide, then create (or recreate) the source row the file's records will reference.
    pub fn admit(&self, fingerprint: &NewSourceFile) -> Result<(SourceFile, Admission)> {
        let admission = self.decide(fingerprint)?;
        let source = self.repository.upsert_source_file(fingerprint)?;
        match admission {
            Admission::New => info!(name = %source.name, id = source.id, "New source file"),
            Admission::Reparse(reason) => {
                info!(name = %source.name, id = source.id, %reason, "Reparsing source file");
            }
        }
        Ok((source, admission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockCitationRepository;
    use mockall::predicate::eq;

    fn fingerprint_of(checksum: &str, size: u64) -> NewSourceFile {
        NewSourceFile {
            name: "pubmed24n0001.xml.gz".to_string(),
            checksum: checksum.to_string(),
            size,
            path: "/data/pubmed24n0001.xml.gz".to_string(),
        }
    }

    fn stored(checksum: &str, size: u64) -> SourceFile {
        SourceFile {
            id: 3,
            name: "pubmed24n0001.xml.gz".to_string(),
            checksum: checksum.to_string(),
            size,
            path: "/data/pubmed24n0001.xml.gz".to_string(),
        }
    }

    fn repo_with(prior: Option<SourceFile>, records: u64) -> MockCitationRepository {
        let mut repo = MockCitationRepository::new();
        repo.expect_find_source_file()
            .returning(move |_| Ok(prior.clone()));
        repo.expect_count_records_for_source()
            .with(eq(3))
            .returning(move |_| Ok(records));
        repo
    }

    #[test]
    fn test_new_file_is_admitted() {
        let repo = repo_with(None, 0);
        let gate = SourceGate::new(&repo, false);
        assert_eq!(gate.decide(&fingerprint_of("aa", 10)).expect("decide"), Admission::New);
    }

    #[test]
    fn test_unchanged_file_is_already_parsed() {
        let repo = repo_with(Some(stored("aa", 10)), 5);
        let gate = SourceGate::new(&repo, false);
        let err = gate.decide(&fingerprint_of("aa", 10)).expect_err("skip");
        assert!(matches!(err, IngestError::AlreadyParsed(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_reparse_reasons() {
        let cases = [
            (stored("bb", 10), 5, false, ReparseReason::ChecksumChanged),
            (stored("aa", 9), 5, false, ReparseReason::Grown),
            (stored("aa", 10), 0, false, ReparseReason::NoRecords),
            (stored("aa", 10), 5, true, ReparseReason::Forced),
        ];
        for (prior, records, force, expected) in cases {
            let repo = repo_with(Some(prior), records);
            let gate = SourceGate::new(&repo, force);
            assert_eq!(
                gate.decide(&fingerprint_of("aa", 10)).expect("decide"),
                Admission::Reparse(expected)
            );
        }
    }

    #[test]
    fn test_shrunk_file_with_same_checksum_is_skipped() {
        let repo = repo_with(Some(stored("aa", 20)), 5);
        let gate = SourceGate::new(&repo, false);
        assert!(gate.decide(&fingerprint_of("aa", 10)).is_err());
    }

    #[test]
    fn test_admit_upserts_row() {
        let mut repo = repo_with(None, 0);
        repo.expect_upsert_source_file()
            .times(1)
            .returning(|new| {
                Ok(SourceFile {
                    id: 11,
                    name: new.name.clone(),
                    checksum: new.checksum.clone(),
                    size: new.size,
                    path: new.path.clone(),
                })
            });
        let gate = SourceGate::new(&repo, false);
        let (source, admission) = gate.admit(&fingerprint_of("aa", 10)).expect("admit");
        assert_eq!(source.id, 11);
        assert_eq!(admission, Admission::New);
    }

    #[test]
    fn test_fingerprint_of_real_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pubmed24n0002.xml");
        std::fs::write(&path, b"abc").expect("write");

        let fingerprint = fingerprint(&path).expect("fingerprint");
        assert_eq!(fingerprint.name, "pubmed24n0002.xml");
        assert_eq!(fingerprint.size, 3);
        assert_eq!(
            fingerprint.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(Path::new(&fingerprint.path).is_absolute());
    }
}
