//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! The tables themselves are created by the SQL files under `migrations/`.

/// Source file bookkeeping table schema
pub mod source_file {
    /// Table name
    pub const TABLE: &str = "source_file";
    /// Primary key column
    pub const ID: &str = "id";
    /// File name column, unique
    pub const NAME: &str = "name";
    /// Content checksum column, unique
    pub const CHECKSUM: &str = "checksum";
    /// File size in bytes column
    pub const SIZE: &str = "size";
    /// Filesystem path column
    pub const PATH: &str = "path";
}

/// Citation table schema
pub mod citation {
    /// Table name
    pub const TABLE: &str = "citation";
    /// Primary key column
    pub const ID: &str = "id";
    /// PubMed identifier column, unique
    pub const PMID: &str = "pmid";
    /// Journal title column
    pub const JOURNAL: &str = "journal";
    /// Publication date column
    pub const PUBDATE: &str = "pubdate";
    /// Page range column
    pub const PAGE: &str = "page";
    /// Volume column
    pub const VOLUME: &str = "volume";
    /// Issue column
    pub const ISSUE: &str = "issue";
    /// Title column
    pub const TITLE: &str = "title";
    /// Abstract column, nullable
    pub const ABSTRACT: &str = "abstract";
    /// First author initials column, nullable
    pub const AUTHOR: &str = "author";
    /// Language codes column, nullable
    pub const LANGUAGE: &str = "language";
    /// Foreign key to the source file table
    pub const SOURCE_FILE_ID: &str = "source_file_id";
}
