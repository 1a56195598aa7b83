//! Run orchestration: input resolution, gating, extraction, dedup, persistence
//! and backfill, in that order, with one [`RunReport`] threaded through.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::backfill::BackfillMerger;
use crate::config::AppConfig;
use crate::dedup::{deduplicate, Deduplicated};
use crate::error::{IngestError, Result};
use crate::extractor::RecordExtractor;
use crate::gate::SourceGate;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{CitationRecord, InvalidPmidPolicy, PendingFile};
use crate::persist::BatchPersister;
use crate::report::RunReport;
use crate::repository::CitationRepository;
use crate::validation::{is_glob, InputValidator};
use crate::worker::{ExtractionWorkerPool, FileOutcome};

/// Per-run knobs, resolved from configuration and command-line flags.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Worker threads, `0` for one per CPU
    pub concurrency: usize,
    /// Records per persistence transaction
    pub chunk_size: usize,
    /// Treatment of articles without a pmid
    pub invalid_pmid_policy: InvalidPmidPolicy,
    /// Reparse files even when unchanged
    pub force: bool,
    /// Only process a small sorted prefix of the inputs
    pub test_mode: bool,
    /// Size of that prefix
    pub test_mode_file_limit: usize,
    /// Naming convention applied to directory listings
    pub file_pattern: Regex,
}

impl IngestOptions {
    /// Options from configuration, with `force` and `test_mode` taken from the command line.
    pub fn from_config(config: &AppConfig, force: bool, test_mode: bool) -> Result<Self> {
        let file_pattern = Regex::new(&config.ingest.file_pattern)
            .map_err(|e| IngestError::InvalidConfig(format!("file_pattern: {e}")))?;
        Ok(Self {
            concurrency: config.ingest.concurrency,
            chunk_size: config.ingest.chunk_size,
            invalid_pmid_policy: config.ingest.invalid_pmid_policy,
            force,
            test_mode,
            test_mode_file_limit: config.ingest.test_mode_file_limit,
            file_pattern,
        })
    }
}

/// Expand the input root into a sorted list of files.
///
/// A glob pattern is expanded as is, a directory is listed and filtered by
/// `pattern`, anything else must be an existing file. An unreadable root is
/// [`IngestError::InputUnavailable`].
pub fn resolve_inputs(input: &str, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let mut files = if is_glob(input) {
        let entries = glob::glob(input).map_err(|e| IngestError::InputUnavailable(format!("{input}: {e}")))?;
        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Unreadable glob match"),
            }
        }
        files
    } else {
        let root = Path::new(input);
        if root.is_dir() {
            list_directory(root, pattern)?
        } else if root.is_file() {
            vec![root.to_path_buf()]
        } else {
            return Err(IngestError::InputUnavailable(format!("{input} does not exist")));
        }
    };

    files.sort();
    debug!(input, files = files.len(), "Resolved inputs");
    Ok(files)
}

fn list_directory(root: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| IngestError::InputUnavailable(format!("{}: {e}", root.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::InputUnavailable(format!("{}: {e}", root.display())))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Err(reason) = InputValidator::validate_file_name(name, pattern) {
            debug!(%reason, "Skipping directory entry");
            continue;
        }
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Keep the first `limit` entries of an already sorted list.
#[must_use]
pub fn test_mode_prefix(mut files: Vec<PathBuf>, limit: usize) -> Vec<PathBuf> {
    files.truncate(limit);
    files
}

/// Drives one ingestion run against a citation store.
pub struct IngestService<'a, R: CitationRepository + ?Sized> {
    repository: &'a R,
    options: IngestOptions,
    metrics: MetricsCollector,
}

impl<'a, R: CitationRepository + ?Sized> IngestService<'a, R> {
    /// Create a service writing through `repository`.
    pub fn new(repository: &'a R, options: IngestOptions) -> Self {
        Self {
            repository,
            options,
            metrics: MetricsCollector::default(),
        }
    }

    /// Run the whole pipeline over `input`.
    ///
    /// Returns `Err` only for fatal failures: the input root or the store being
    /// unavailable. Everything else is contained and counted in the report.
    pub fn run(&self, input: &str) -> Result<RunReport> {
        let mut report = RunReport::new();

        let timer = OperationTimer::new("read");
        let files = self.inputs(input)?;
        let pool = ExtractionWorkerPool::new(
            self.options.concurrency,
            RecordExtractor::new(self.options.invalid_pmid_policy),
        )?;
        self.metrics.update_worker_threads(pool.threads());
        let pending = self.gate(&pool, &files, &mut report)?;
        self.finish_stage(timer);

        let timer = OperationTimer::new("parse");
        let records = extract_all(&pool, pending, &mut report);
        self.finish_stage(timer);

        let timer = OperationTimer::new("dedup");
        let Deduplicated { unique, mut duplicates } = deduplicate(records);
        report.duplicates_seen = duplicates.len() as u64;
        self.finish_stage(timer);

        let timer = OperationTimer::new("persist");
        let conflicts = BatchPersister::new(self.options.chunk_size).persist(self.repository, &unique, &mut report)?;
        duplicates.extend(conflicts);
        self.finish_stage(timer);

        let timer = OperationTimer::new("backfill");
        BackfillMerger::merge(self.repository, &duplicates, &mut report)?;
        self.finish_stage(timer);

        self.metrics.record_run(&report);
        report.log_summary();
        Ok(report)
    }

    fn inputs(&self, input: &str) -> Result<Vec<PathBuf>> {
        let files = resolve_inputs(input, &self.options.file_pattern)?;
        if self.options.test_mode {
            let files = test_mode_prefix(files, self.options.test_mode_file_limit);
            info!(files = files.len(), "Test mode, processing a prefix of the inputs");
            return Ok(files);
        }
        Ok(files)
    }

    /// Fingerprint in parallel, then admit sequentially so source rows are
    /// created before any worker starts.
    fn gate(&self, pool: &ExtractionWorkerPool, files: &[PathBuf], report: &mut RunReport) -> Result<Vec<PendingFile>> {
        let gate = SourceGate::new(self.repository, self.options.force);
        let mut pending = Vec::with_capacity(files.len());

        for (path, fingerprint) in pool.fingerprint_all(files) {
            let fingerprint = match fingerprint {
                Ok(fingerprint) => fingerprint,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Cannot read input file");
                    report.files_unparsable += 1;
                    continue;
                }
            };

            match gate.admit(&fingerprint) {
                Ok((source, _)) => pending.push(PendingFile {
                    path,
                    source_id: source.id,
                }),
                Err(IngestError::AlreadyParsed(name)) => {
                    info!(name, "File already parsed, skipping");
                    report.files_already_parsed += 1;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Cannot register input file");
                    report.files_unparsable += 1;
                }
            }
        }
        Ok(pending)
    }

    fn finish_stage(&self, timer: OperationTimer) {
        let stage = timer.operation();
        self.metrics.record_stage(stage, timer.finish());
    }
}

/// Extract records from inputs without touching a store.
///
/// Used by `export`; records carry source id `0` and no gating is applied.
pub fn extract_unique(input: &str, options: &IngestOptions) -> Result<(Vec<CitationRecord>, RunReport)> {
    let mut report = RunReport::new();
    let mut files = resolve_inputs(input, &options.file_pattern)?;
    if options.test_mode {
        files = test_mode_prefix(files, options.test_mode_file_limit);
    }

    let pool = ExtractionWorkerPool::new(options.concurrency, RecordExtractor::new(options.invalid_pmid_policy))?;
    let pending = files
        .into_iter()
        .map(|path| PendingFile { path, source_id: 0 })
        .collect();
    let records = extract_all(&pool, pending, &mut report);

    let Deduplicated { unique, duplicates } = deduplicate(records);
    report.duplicates_seen = duplicates.len() as u64;
    Ok((unique, report))
}

fn extract_all(pool: &ExtractionWorkerPool, pending: Vec<PendingFile>, report: &mut RunReport) -> Vec<CitationRecord> {
    let mut records = Vec::new();
    pool.run(pending, |outcome| match outcome {
        FileOutcome::Extracted { path, extraction } => {
            debug!(path = %path.display(), records = extraction.records.len(), "Aggregated file");
            report.record_file(&extraction);
            records.extend(extraction.records);
        }
        FileOutcome::Unparsable(_) => report.files_unparsable += 1,
    });
    records
}
