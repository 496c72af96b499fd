use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use super::brand::derive_brand;
use super::corrections::{apply_corrections, BrandCorrections};
use super::stopwords::{filter_stopwords, StopwordSet};
use crate::constants::{COL_BRAND, COL_NAME};
use crate::error::Result;
use crate::observability::metrics;
use crate::table::{InputEncoding, ProductTable};

/// Counts reported by the brand normalization stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub rows_in: usize,
    /// Whether brands were taken from the name because the table had no brand column
    pub brand_derived_from_name: bool,
    pub stopword_rows_removed: usize,
    pub brands_corrected: usize,
    pub rows_out: usize,
}

/// Canonicalize brands, drop stopword brands and apply spelling corrections.
pub fn normalize_table(
    table: &mut ProductTable,
    stopwords: &StopwordSet,
    corrections: &BrandCorrections,
) -> NormalizeReport {
    let rows_in = table.len();
    let brand_derived_from_name = !table.has_column(COL_BRAND);

    derive_brand(&mut table.records, !brand_derived_from_name);
    table.ensure_column(COL_BRAND);

    let stopword_rows_removed = filter_stopwords(&mut table.records, stopwords);
    let brands_corrected = apply_corrections(&mut table.records, corrections);

    NormalizeReport {
        rows_in,
        brand_derived_from_name,
        stopword_rows_removed,
        brands_corrected,
        rows_out: table.len(),
    }
}

/// Run the brand normalization stage from `input` to `output`.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run_normalize(
    input: &Path,
    output: &Path,
    encoding: InputEncoding,
    stopwords: &StopwordSet,
    corrections: &BrandCorrections,
) -> Result<NormalizeReport> {
    let started = Instant::now();
    let (mut table, stats) = ProductTable::load(input, encoding)?;
    table.require_columns(&[COL_NAME], &input.display().to_string())?;
    metrics::table::loaded(&stats);

    let report = normalize_table(&mut table, stopwords, corrections);
    table.save(output)?;

    metrics::table::written(report.rows_out);
    metrics::normalize::stopword_rows_removed(report.stopword_rows_removed);
    metrics::normalize::brands_corrected(report.brands_corrected);
    metrics::stage_duration("normalize", started.elapsed().as_secs_f64());
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        corrected = report.brands_corrected,
        "Saved normalized brand data"
    );
    Ok(report)
}
