//! Data models for citation extraction and storage
//!
//! This module contains the plain data structures that flow through the
//! pipeline: extracted citation records, source file bookkeeping rows and the
//! small policy enums the pipeline is configured with.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reserved pmid standing in for "unknown or invalid".
pub const SENTINEL_PMID: u64 = 0;

/// Largest pmid the store can hold as a signed 64-bit integer.
pub const MAX_PMID: u64 = i64::MAX.unsigned_abs();

/// Reserved year used when an article carries no publication year.
pub const SENTINEL_YEAR: i32 = 1000;

/// One normalized bibliographic entry extracted from a `PubmedArticle` node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    /// PubMed identifier, [`SENTINEL_PMID`] when it could not be read
    pub pmid: u64,
    /// Journal title
    pub journal: Option<String>,
    /// Publication date, month and day default to 1
    pub pubdate: NaiveDate,
    /// Journal volume
    pub volume: Option<String>,
    /// Journal issue
    pub issue: Option<String>,
    /// Article title
    pub title: Option<String>,
    /// Abstract text, paragraphs joined with a single space
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Page range as printed in MEDLINE (`MedlinePgn`)
    pub page: Option<String>,
    /// Initials of the first listed author
    pub author: Option<String>,
    /// Language codes, comma separated
    pub language: Option<String>,
    /// Database id of the source file this record was read from
    #[serde(skip)]
    pub source_id: i64,
}

impl CitationRecord {
    /// Whether the record carries a real pmid.
    #[must_use]
    pub const fn has_valid_pmid(&self) -> bool {
        self.pmid != SENTINEL_PMID
    }

    /// The abstract, when present and non-empty.
    #[must_use]
    pub fn non_empty_abstract(&self) -> Option<&str> {
        self.abstract_text.as_deref().filter(|a| !a.is_empty())
    }
}

/// Database representation of an ingested input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Database primary key
    pub id: i64,
    /// File name without directory, unique
    pub name: String,
    /// Hex encoded SHA-256 of the file contents
    pub checksum: String,
    /// File size in bytes
    pub size: u64,
    /// Absolute path the file was read from
    pub path: String,
}

/// A source file row that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSourceFile {
    /// File name without directory
    pub name: String,
    /// Hex encoded SHA-256 of the file contents
    pub checksum: String,
    /// File size in bytes
    pub size: u64,
    /// Absolute path the file was read from
    pub path: String,
}

/// An input file selected for extraction, bound to its source row
#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Path to read
    pub path: PathBuf,
    /// Id of the source row created for this run
    pub source_id: i64,
}

/// What to do with articles whose pmid could not be recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPmidPolicy {
    /// Exclude such records before deduplication
    #[default]
    Drop,
    /// Keep them; they collapse into a single flagged `pmid = 0` row
    Keep,
}

impl FromStr for InvalidPmidPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "keep" => Ok(Self::Keep),
            other => Err(format!("unknown invalid pmid policy: {other} (expected drop or keep)")),
        }
    }
}

impl fmt::Display for InvalidPmidPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => f.write_str("drop"),
            Self::Keep => f.write_str("keep"),
        }
    }
}

/// Output format for exported records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values format
    Csv,
    /// JSON array format
    Json,
}

impl OutputFormat {
    /// Get the file extension for this format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format: {other} (expected json or csv)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("drop".parse::<InvalidPmidPolicy>(), Ok(InvalidPmidPolicy::Drop));
        assert_eq!("KEEP".parse::<InvalidPmidPolicy>(), Ok(InvalidPmidPolicy::Keep));
        assert!("merge".parse::<InvalidPmidPolicy>().is_err());
        assert_eq!(InvalidPmidPolicy::default(), InvalidPmidPolicy::Drop);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("Csv".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("txt".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Csv.extension(), "csv");
    }
}
