//! Bounded pool of extraction workers feeding one aggregation consumer.
//!
//! Every job owns one input file end to end and shares nothing mutable with the
//! other jobs. Results travel over a bounded channel to the caller's thread,
//! which is the only place they are aggregated.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info};

use crate::error::{IngestError, Result};
use crate::extractor::{FileExtraction, RecordExtractor};
use crate::gate;
use crate::models::{NewSourceFile, PendingFile};

/// What one job reports back for its file.
#[derive(Debug)]
pub enum FileOutcome {
    /// The file was read to the end
    Extracted {
        /// Input path
        path: PathBuf,
        /// Records and counts
        extraction: FileExtraction,
    },
    /// Decompression or XML parsing failed, the file is skipped
    Unparsable(IngestError),
}

/// Rayon-backed pool running [`RecordExtractor`] over input files.
pub struct ExtractionWorkerPool {
    pool: ThreadPool,
    threads: usize,
    extractor: RecordExtractor,
}

impl ExtractionWorkerPool {
    /// Build a pool with `concurrency` workers; `0` means one per CPU.
    pub fn new(concurrency: usize, extractor: RecordExtractor) -> Result<Self> {
        let threads = if concurrency == 0 { num_cpus::get() } else { concurrency };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("extract-{idx}"))
            .build()
            .map_err(|e| IngestError::InvalidConfig(format!("cannot build worker pool: {e}")))?;
        Ok(Self {
            pool,
            threads,
            extractor,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Checksum `paths` on the pool, preserving input order.
    pub fn fingerprint_all(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<NewSourceFile>)> {
        self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| (path.clone(), gate::fingerprint(path)))
                .collect()
        })
    }

    /// Extract every file, handing each outcome to `consume` as it completes.
    ///
    /// `consume` runs on the calling thread only. Completion order is not the
    /// input order.
    pub fn run<F>(&self, files: Vec<PendingFile>, mut consume: F)
    where
        F: FnMut(FileOutcome),
    {
        let channel_capacity = (self.threads * 2).max(16);
        let (sender, receiver): (Sender<FileOutcome>, Receiver<FileOutcome>) = bounded(channel_capacity);
        info!(files = files.len(), threads = self.threads, "Starting extraction");

        for file in files {
            let sender = sender.clone();
            let extractor = self.extractor;
            self.pool.spawn(move || {
                let outcome = extract_file(extractor, &file);
                if sender.send(outcome).is_err() {
                    error!(path = %file.path.display(), "Aggregator hung up, dropping file outcome");
                }
            });
        }
        drop(sender);

        for outcome in receiver {
            consume(outcome);
        }
    }
}

/// Open an input file, transparently decompressing `.gz` members.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let is_gzip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn extract_file(extractor: RecordExtractor, file: &PendingFile) -> FileOutcome {
    let start = Instant::now();
    let result = open_source(&file.path).and_then(|source| extractor.extract_document(source, file.source_id));

    match result {
        Ok(extraction) => {
            debug!(
                path = %file.path.display(),
                articles = extraction.articles,
                records = extraction.records.len(),
                duration_ms = start.elapsed().as_millis(),
                "File extracted"
            );
            FileOutcome::Extracted {
                path: file.path.clone(),
                extraction,
            }
        }
        Err(err) => {
            error!(path = %file.path.display(), error = %err, "Skipping unparsable file");
            FileOutcome::Unparsable(IngestError::UnparsableFile {
                path: file.path.clone(),
                reason: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvalidPmidPolicy;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn document(pmids: &[u64]) -> String {
        let articles: String = pmids
            .iter()
            .map(|pmid| {
                format!(
                    "<PubmedArticle><MedlineCitation><PMID>{pmid}</PMID><Article>\
                     <ArticleTitle>T{pmid}</ArticleTitle></Article></MedlineCitation></PubmedArticle>"
                )
            })
            .collect();
        format!("<?xml version=\"1.0\"?><PubmedArticleSet>{articles}</PubmedArticleSet>")
    }

    fn write_gz(path: &Path, body: &str) {
        let mut encoder = GzEncoder::new(File::create(path).expect("create"), Compression::default());
        encoder.write_all(body.as_bytes()).expect("write");
        encoder.finish().expect("finish");
    }

    #[test]
    fn test_gzip_and_plain_inputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gz = dir.path().join("pubmed24n0001.xml.gz");
        let plain = dir.path().join("pubmed24n0002.xml");
        write_gz(&gz, &document(&[1, 2]));
        std::fs::write(&plain, document(&[3])).expect("write");

        let pool = ExtractionWorkerPool::new(2, RecordExtractor::new(InvalidPmidPolicy::Drop)).expect("pool");
        let files = vec![
            PendingFile { path: gz, source_id: 1 },
            PendingFile { path: plain, source_id: 2 },
        ];

        let mut records = Vec::new();
        pool.run(files, |outcome| match outcome {
            FileOutcome::Extracted { extraction, .. } => records.extend(extraction.records),
            FileOutcome::Unparsable(err) => panic!("unexpected failure: {err}"),
        });

        let mut pmids: Vec<(u64, i64)> = records.iter().map(|r| (r.pmid, r.source_id)).collect();
        pmids.sort_unstable();
        assert_eq!(pmids, vec![(1, 1), (2, 1), (3, 2)]);
    }

    #[test]
    fn test_corrupt_archive_is_reported_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let corrupt = dir.path().join("pubmed24n0003.xml.gz");
        std::fs::write(&corrupt, b"definitely not gzip").expect("write");
        let good = dir.path().join("pubmed24n0004.xml");
        std::fs::write(&good, document(&[9])).expect("write");

        let pool = ExtractionWorkerPool::new(0, RecordExtractor::default()).expect("pool");
        assert!(pool.threads() >= 1);

        let mut extracted = 0;
        let mut unparsable = Vec::new();
        pool.run(
            vec![
                PendingFile { path: corrupt.clone(), source_id: 1 },
                PendingFile { path: good, source_id: 2 },
            ],
            |outcome| match outcome {
                FileOutcome::Extracted { .. } => extracted += 1,
                FileOutcome::Unparsable(err) => unparsable.push(err),
            },
        );

        assert_eq!(extracted, 1);
        assert_eq!(unparsable.len(), 1);
        assert!(matches!(&unparsable[0], IngestError::UnparsableFile { path, .. } if *path == corrupt));
    }

    #[test]
    fn test_multi_member_gzip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pubmed24n0005.xml.gz");
        let body = document(&[7, 8]);
        let (head, tail) = body.split_at(body.len() / 2);

        let mut bytes = Vec::new();
        for part in [head, tail] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(part.as_bytes()).expect("write");
            bytes.extend(encoder.finish().expect("finish"));
        }
        std::fs::write(&path, bytes).expect("write");

        let extraction = RecordExtractor::default()
            .extract_document(open_source(&path).expect("open"), 1)
            .expect("extract");
        assert_eq!(extraction.records.len(), 2);
    }

    #[test]
    fn test_fingerprints_keep_input_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths: Vec<PathBuf> = (1..=4)
            .map(|i| {
                let path = dir.path().join(format!("pubmed24n000{i}.xml"));
                std::fs::write(&path, document(&[i])).expect("write");
                path
            })
            .collect();
        let missing = dir.path().join("pubmed24n0009.xml");

        let pool = ExtractionWorkerPool::new(3, RecordExtractor::default()).expect("pool");
        let mut inputs = paths.clone();
        inputs.push(missing);
        let fingerprints = pool.fingerprint_all(&inputs);

        assert_eq!(fingerprints.len(), 5);
        for (expected, (path, result)) in paths.iter().zip(&fingerprints) {
            assert_eq!(expected, path);
            assert!(result.is_ok());
        }
        assert!(fingerprints[4].1.is_err());
    }
}
