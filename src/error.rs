//! Error types for the pubmed-parser-rust library.
//!
//! Failures are contained at the smallest unit possible: an article, a file,
//! or a persistence chunk. Only [`IngestError::StoreUnavailable`] and
//! [`IngestError::InputUnavailable`] abort a run; [`IngestError::is_fatal`]
//! encodes that split so callers do not have to re-derive it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while ingesting PubMed citation files.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The file is unchanged since it was last parsed and still has records
    #[error("File already parsed: {0}")]
    AlreadyParsed(String),

    /// The file could not be decompressed or its XML could not be read
    #[error("Unparsable file {path}: {reason}")]
    UnparsableFile {
        /// Path of the offending file
        path: PathBuf,
        /// Decoder or parser message
        reason: String,
    },

    /// A single article carried a field that could not be interpreted
    #[error("Field extraction defect in article {pmid}: {field}: {reason}")]
    FieldExtractionDefect {
        /// Article identifier, `0` when unknown
        pmid: u64,
        /// Element the defect was found on
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Year, month and day did not form a valid calendar date
    #[error("Invalid publication date {year}-{month}-{day}")]
    DateConstructionFailure {
        /// Year as extracted
        year: i32,
        /// Month as extracted
        month: u32,
        /// Day as extracted
        day: u32,
    },

    /// The XML stream ended early or nested elements incorrectly
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// Rows of a chunk violated a store constraint
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// The relational store could not be opened or reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The input root could not be read
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML reader errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl IngestError {
    /// Whether the error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::InputUnavailable(_) | Self::Pool(_)
        )
    }

    /// Whether the error is a unique or foreign key violation reported by SQLite.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::PersistenceConflict(_) => true,
            Self::Database(err) => is_constraint_violation(err),
            _ => false,
        }
    }
}

/// Whether a rusqlite error is a constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

/// Convenience type alias for Result with `IngestError`
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_split() {
        assert!(IngestError::StoreUnavailable("gone".into()).is_fatal());
        assert!(IngestError::InputUnavailable("gone".into()).is_fatal());
        assert!(!IngestError::AlreadyParsed("a.xml.gz".into()).is_fatal());
        assert!(!IngestError::PersistenceConflict("dup".into()).is_fatal());
        assert!(!IngestError::UnparsableFile {
            path: PathBuf::from("a.xml.gz"),
            reason: "bad gzip".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_constraint_violation_detection() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (k INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .expect("setup");
        let err = conn.execute("INSERT INTO t VALUES (1)", []).expect_err("duplicate");
        assert!(IngestError::from(err).is_constraint_violation());
    }
}
