//! Simple metrics module for the coffee_insights pipeline
//!
//! Every stage records counters through the `metrics` facade. A Prometheus recorder
//! is installed at startup; batch commands render it to a snapshot file when
//! `metrics.snapshot_path` is configured.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Scrape metrics
    ScrapePagesFetched,
    ScrapePagesFailed,
    ScrapeItemsExtracted,
    ScrapeItemsSkipped,

    // Table metrics
    TableRowsLoaded,
    TableRowsUnreadable,
    TableRowsOverlong,
    TableMalformedNumbers,
    TableRowsWritten,

    // Clean metrics
    CleanDuplicatesRemoved,
    CleanStopwordRowsRemoved,

    // Normalize metrics
    NormalizeStopwordRowsRemoved,
    NormalizeBrandsCorrected,

    // Enrich metrics
    EnrichRowsExcluded,
    EnrichQuantityMissing,
    EnrichTypeMissing,

    // Analytics metrics
    AnalyticsRowsUsed,
    AnalyticsRowsExcluded,

    StageDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ScrapePagesFetched => "coffee_scrape_pages_fetched_total",
            MetricName::ScrapePagesFailed => "coffee_scrape_pages_failed_total",
            MetricName::ScrapeItemsExtracted => "coffee_scrape_items_extracted_total",
            MetricName::ScrapeItemsSkipped => "coffee_scrape_items_skipped_total",

            MetricName::TableRowsLoaded => "coffee_table_rows_loaded_total",
            MetricName::TableRowsUnreadable => "coffee_table_rows_unreadable_total",
            MetricName::TableRowsOverlong => "coffee_table_rows_overlong_total",
            MetricName::TableMalformedNumbers => "coffee_table_malformed_numbers_total",
            MetricName::TableRowsWritten => "coffee_table_rows_written_total",

            MetricName::CleanDuplicatesRemoved => "coffee_clean_duplicates_removed_total",
            MetricName::CleanStopwordRowsRemoved => "coffee_clean_stopword_rows_removed_total",

            MetricName::NormalizeStopwordRowsRemoved => {
                "coffee_normalize_stopword_rows_removed_total"
            }
            MetricName::NormalizeBrandsCorrected => "coffee_normalize_brands_corrected_total",

            MetricName::EnrichRowsExcluded => "coffee_enrich_rows_excluded_total",
            MetricName::EnrichQuantityMissing => "coffee_enrich_quantity_missing_total",
            MetricName::EnrichTypeMissing => "coffee_enrich_type_missing_total",

            MetricName::AnalyticsRowsUsed => "coffee_analytics_rows_used_total",
            MetricName::AnalyticsRowsExcluded => "coffee_analytics_rows_excluded_total",

            MetricName::StageDuration => "coffee_stage_duration_seconds",
        }
    }
}

static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent; failures are logged, not fatal.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            info!("Metrics recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render the current metrics in Prometheus text format
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Write the Prometheus rendering to `path`, if the recorder is installed.
pub fn write_snapshot(path: &Path) -> std::io::Result<()> {
    if let Some(text) = render() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        info!(path = %path.display(), "Wrote metrics snapshot");
    }
    Ok(())
}

fn count(name: MetricName, value: usize) {
    ::metrics::counter!(name.as_str()).increment(value as u64);
}

/// Record how long a stage took
pub fn stage_duration(stage: &'static str, secs: f64) {
    ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
}

// ============================================================================
// Scrape Metrics
// ============================================================================

pub mod scrape {
    use super::{count, MetricName};

    pub fn page_fetched() {
        count(MetricName::ScrapePagesFetched, 1);
    }

    pub fn page_failed() {
        count(MetricName::ScrapePagesFailed, 1);
    }

    /// Record the outcome of extracting one page
    pub fn items(extracted: usize, skipped: usize) {
        count(MetricName::ScrapeItemsExtracted, extracted);
        count(MetricName::ScrapeItemsSkipped, skipped);
    }
}

// ============================================================================
// Table Metrics
// ============================================================================

pub mod table {
    use super::{count, MetricName};
    use crate::table::LoadStats;

    pub fn loaded(stats: &LoadStats) {
        count(MetricName::TableRowsLoaded, stats.rows);
        count(MetricName::TableRowsUnreadable, stats.unreadable_rows);
        count(MetricName::TableRowsOverlong, stats.overlong_rows);
        count(
            MetricName::TableMalformedNumbers,
            stats.malformed.values().sum(),
        );
    }

    pub fn written(rows: usize) {
        count(MetricName::TableRowsWritten, rows);
    }
}

// ============================================================================
// Clean / Normalize Metrics
// ============================================================================

pub mod clean {
    use super::{count, MetricName};

    pub fn duplicates_removed(n: usize) {
        count(MetricName::CleanDuplicatesRemoved, n);
    }

    pub fn stopword_rows_removed(n: usize) {
        count(MetricName::CleanStopwordRowsRemoved, n);
    }
}

pub mod normalize {
    use super::{count, MetricName};

    pub fn stopword_rows_removed(n: usize) {
        count(MetricName::NormalizeStopwordRowsRemoved, n);
    }

    pub fn brands_corrected(n: usize) {
        count(MetricName::NormalizeBrandsCorrected, n);
    }
}

// ============================================================================
// Enrich Metrics
// ============================================================================

pub mod enrich {
    use super::{count, MetricName};

    pub fn rows_excluded(n: usize) {
        count(MetricName::EnrichRowsExcluded, n);
    }

    pub fn quantity_missing(n: usize) {
        count(MetricName::EnrichQuantityMissing, n);
    }

    pub fn type_missing(n: usize) {
        count(MetricName::EnrichTypeMissing, n);
    }
}

// ============================================================================
// Analytics Metrics
// ============================================================================

pub mod analytics {
    use super::MetricName;

    /// Rows that fed a model vs rows dropped for missing values
    pub fn rows(command: &'static str, used: usize, excluded: usize) {
        ::metrics::counter!(MetricName::AnalyticsRowsUsed.as_str(), "command" => command)
            .increment(used as u64);
        ::metrics::counter!(MetricName::AnalyticsRowsExcluded.as_str(), "command" => command)
            .increment(excluded as u64);
    }
}
