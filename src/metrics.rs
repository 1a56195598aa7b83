use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::report::RunReport;

/// Metric names published for ingestion runs
///
/// Nothing is exported unless the binary installs a recorder; without one the
/// `metrics` macros are no-ops.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // File metrics
    pub files_processed_total: &'static str,
    pub files_already_parsed_total: &'static str,
    pub files_unparsable_total: &'static str,

    // Record metrics
    pub records_extracted_total: &'static str,
    pub records_persisted_total: &'static str,
    pub duplicates_seen_total: &'static str,
    pub records_backfilled_total: &'static str,

    // Data quality metrics
    pub defective_articles_total: &'static str,
    pub date_fallbacks_total: &'static str,
    pub invalid_pmids_dropped_total: &'static str,

    // Store metrics
    pub persistence_conflicts_total: &'static str,
    pub records_rejected_total: &'static str,
    pub chunks_committed_total: &'static str,
    pub chunks_failed_total: &'static str,

    // Timing
    pub stage_duration: &'static str,
    pub worker_threads: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            files_processed_total: "pubmed_parser_files_processed_total",
            files_already_parsed_total: "pubmed_parser_files_already_parsed_total",
            files_unparsable_total: "pubmed_parser_files_unparsable_total",

            records_extracted_total: "pubmed_parser_records_extracted_total",
            records_persisted_total: "pubmed_parser_records_persisted_total",
            duplicates_seen_total: "pubmed_parser_duplicates_seen_total",
            records_backfilled_total: "pubmed_parser_records_backfilled_total",

            defective_articles_total: "pubmed_parser_defective_articles_total",
            date_fallbacks_total: "pubmed_parser_date_fallbacks_total",
            invalid_pmids_dropped_total: "pubmed_parser_invalid_pmids_dropped_total",

            persistence_conflicts_total: "pubmed_parser_persistence_conflicts_total",
            records_rejected_total: "pubmed_parser_records_rejected_total",
            chunks_committed_total: "pubmed_parser_chunks_committed_total",
            chunks_failed_total: "pubmed_parser_chunks_failed_total",

            stage_duration: "pubmed_parser_stage_duration_seconds",
            worker_threads: "pubmed_parser_worker_threads",
        }
    }
}

impl MetricsCollector {
    /// Publish the counters of a finished run
    pub fn record_run(&self, report: &RunReport) {
        counter!(self.files_processed_total).increment(report.files_processed);
        counter!(self.files_already_parsed_total).increment(report.files_already_parsed);
        counter!(self.files_unparsable_total).increment(report.files_unparsable);

        counter!(self.records_extracted_total).increment(report.raw_records);
        counter!(self.records_persisted_total).increment(report.records_persisted);
        counter!(self.duplicates_seen_total).increment(report.duplicates_seen);
        counter!(self.records_backfilled_total).increment(report.records_backfilled);

        counter!(self.defective_articles_total).increment(report.defective_articles);
        counter!(self.date_fallbacks_total).increment(report.date_fallbacks);
        counter!(self.invalid_pmids_dropped_total).increment(report.invalid_pmids_dropped);

        counter!(self.persistence_conflicts_total).increment(report.persistence_conflicts);
        counter!(self.records_rejected_total).increment(report.records_rejected);
        counter!(self.chunks_committed_total).increment(report.chunks_committed);
        counter!(self.chunks_failed_total).increment(report.chunks_failed);
    }

    /// Record how long a pipeline stage took
    pub fn record_stage(&self, stage: &'static str, duration: Duration) {
        histogram!(self.stage_duration, "stage" => stage).record(duration.as_secs_f64());
    }

    /// Update the worker pool size
    #[allow(clippy::cast_precision_loss)]
    pub fn update_worker_threads(&self, threads: usize) {
        gauge!(self.worker_threads).set(threads as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_names() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.files_processed_total, "pubmed_parser_files_processed_total");
        assert!(collector.stage_duration.starts_with("pubmed_parser_"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::default();
        collector.record_run(&RunReport::default());
        collector.record_stage("parse", Duration::from_millis(3));
        collector.update_worker_threads(4);
    }
}
