use std::fs;
use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{is_constraint_violation, IngestError, Result};
use crate::models::{CitationRecord, NewSourceFile, SourceFile};
use crate::repository::{CitationRepository, RowRejection};
use crate::schema::{citation, source_file};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Database")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl Database {
    /// Open (creating if needed) the SQLite store at `database_url` and run migrations.
    ///
    /// Any failure here is reported as [`IngestError::StoreUnavailable`].
    pub fn new(database_url: &str, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        let path = strip_scheme(database_url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    IngestError::StoreUnavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        // Set up connection manager and pool
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(busy_timeout)
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| IngestError::StoreUnavailable(format!("{path}: {e}")))?;

        let database = Self { pool };
        database
            .run_migrations()
            .map_err(|e| IngestError::StoreUnavailable(format!("migration failed on {path}: {e}")))?;

        info!(path, "Citation store ready");
        Ok(database)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(include_str!("../migrations/2026-10-01-000000_create_tables/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .map_err(|e| IngestError::StoreUnavailable(format!("cannot check out connection: {e}")))
    }

    /// Get a persisted citation by pmid
    pub fn citation_by_pmid(&self, pmid: u64) -> Result<Option<CitationRecord>> {
        let conn = self.get_connection()?;

        let record = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", citation::TABLE, citation::PMID),
                params![pmid],
                map_citation,
            )
            .optional()?;

        Ok(record)
    }

    /// Total number of persisted citations
    pub fn count_citations(&self) -> Result<u64> {
        let conn = self.get_connection()?;
        let count: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", citation::TABLE),
            params![],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total number of source file rows
    pub fn count_source_files(&self) -> Result<u64> {
        let conn = self.get_connection()?;
        let count: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", source_file::TABLE),
            params![],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn strip_scheme(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

fn insert_citation_sql() -> String {
    format!(
        "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        citation::TABLE,
        citation::PMID,
        citation::JOURNAL,
        citation::PUBDATE,
        citation::PAGE,
        citation::VOLUME,
        citation::ISSUE,
        citation::TITLE,
        citation::ABSTRACT,
        citation::AUTHOR,
        citation::LANGUAGE,
        citation::SOURCE_FILE_ID
    )
}

fn execute_insert(stmt: &mut rusqlite::CachedStatement<'_>, record: &CitationRecord) -> rusqlite::Result<usize> {
    let pmid = i64::try_from(record.pmid).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    stmt.execute(params![
        pmid,
        record.journal,
        record.pubdate,
        record.page,
        record.volume,
        record.issue,
        record.title,
        record.abstract_text,
        record.author,
        record.language,
        record.source_id
    ])
}

/// Map a database row to a CitationRecord
fn map_citation(row: &Row) -> rusqlite::Result<CitationRecord> {
    Ok(CitationRecord {
        pmid: row.get(citation::PMID)?,
        journal: row.get(citation::JOURNAL)?,
        pubdate: row.get(citation::PUBDATE)?,
        volume: row.get(citation::VOLUME)?,
        issue: row.get(citation::ISSUE)?,
        title: row.get(citation::TITLE)?,
        abstract_text: row.get(citation::ABSTRACT)?,
        page: row.get(citation::PAGE)?,
        author: row.get(citation::AUTHOR)?,
        language: row.get(citation::LANGUAGE)?,
        source_id: row.get(citation::SOURCE_FILE_ID)?,
    })
}

/// Map a database row to a SourceFile
fn map_source_file(row: &Row) -> rusqlite::Result<SourceFile> {
    Ok(SourceFile {
        id: row.get(source_file::ID)?,
        name: row.get(source_file::NAME)?,
        checksum: row.get(source_file::CHECKSUM)?,
        size: row.get(source_file::SIZE)?,
        path: row.get(source_file::PATH)?,
    })
}

impl CitationRepository for Database {
    fn find_source_file(&self, name: &str) -> Result<Option<SourceFile>> {
        let conn = self.get_connection()?;

        let source = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", source_file::TABLE, source_file::NAME),
                params![name],
                map_source_file,
            )
            .optional()?;

        Ok(source)
    }

    fn count_records_for_source(&self, source_id: i64) -> Result<u64> {
        let conn = self.get_connection()?;
        let count: u64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?",
                citation::TABLE,
                citation::SOURCE_FILE_ID
            ),
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn upsert_source_file(&self, source: &NewSourceFile) -> Result<SourceFile> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        // The cascade only fires with foreign keys enabled, delete records explicitly too.
        let prior: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    source_file::ID,
                    source_file::TABLE,
                    source_file::NAME
                ),
                params![source.name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(prior_id) = prior {
            let removed = tx.execute(
                &format!("DELETE FROM {} WHERE {} = ?", citation::TABLE, citation::SOURCE_FILE_ID),
                params![prior_id],
            )?;
            tx.execute(
                &format!("DELETE FROM {} WHERE {} = ?", source_file::TABLE, source_file::ID),
                params![prior_id],
            )?;
            debug!(name = %source.name, prior_id, removed, "Removed prior source file");
        }

        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}) VALUES (?, ?, ?, ?)",
                source_file::TABLE,
                source_file::NAME,
                source_file::CHECKSUM,
                source_file::SIZE,
                source_file::PATH
            ),
            params![source.name, source.checksum, source.size, source.path],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(SourceFile {
            id,
            name: source.name.clone(),
            checksum: source.checksum.clone(),
            size: source.size,
            path: source.path.clone(),
        })
    }

    fn insert_records_chunk(&self, records: &[CitationRecord]) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&insert_citation_sql())?;
            for record in records {
                execute_insert(&mut stmt, record)?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn insert_records_skipping_rejects(&self, records: &[CitationRecord]) -> Result<Vec<(usize, RowRejection)>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let mut rejected = Vec::new();
        {
            let mut stmt = tx.prepare_cached(&insert_citation_sql())?;
            for (index, record) in records.iter().enumerate() {
                match execute_insert(&mut stmt, record) {
                    Ok(_) => {}
                    Err(e) if is_constraint_violation(&e) => {
                        debug!(pmid = record.pmid, error = %e, "Rejected conflicting row");
                        rejected.push((index, RowRejection::Conflict));
                    }
                    Err(e @ rusqlite::Error::ToSqlConversionFailure(_)) => {
                        debug!(pmid = record.pmid, error = %e, "Rejected unencodable row");
                        rejected.push((index, RowRejection::Unencodable));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;
        Ok(rejected)
    }

    fn find_null_abstract_by_pmid(&self, pmid: u64) -> Result<Option<i64>> {
        let conn = self.get_connection()?;

        let id = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ? AND {} IS NULL",
                    citation::ID,
                    citation::TABLE,
                    citation::PMID,
                    citation::ABSTRACT
                ),
                params![pmid],
                |row| row.get(0),
            )
            .optional()?;

        Ok(id)
    }

    fn update_abstract(&self, citation_id: i64, abstract_text: &str) -> Result<bool> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {} IS NULL",
                citation::TABLE,
                citation::ABSTRACT,
                citation::ID,
                citation::ABSTRACT
            ),
            params![abstract_text, citation_id],
        )?;
        Ok(updated == 1)
    }
}
