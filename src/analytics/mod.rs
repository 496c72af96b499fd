//! Analytics over the enriched table: k-means clustering, unit price regression and
//! the dashboard report.

pub mod cluster;
pub mod dashboard;
pub mod regression;

pub use cluster::{assign_clusters, ClusterParams, ClusterReport, FeatureMode};
pub use dashboard::{build_report, select, DashboardFilter, DashboardReport};
pub use regression::{fit_regression, RegressionParams, RegressionReport};

use crate::error::PipelineError;
use crate::pipeline::brand::{normalize_brand, transliterate};
use crate::types::ProductRecord;

/// Transliterate names and canonicalize brands before modelling.
pub fn clean_text(records: &mut [ProductRecord]) {
    for record in records.iter_mut() {
        record.name = transliterate(&record.name);
        record.brand = record
            .brand
            .as_deref()
            .map(normalize_brand)
            .filter(|b| !b.is_empty());
    }
}

/// Split records into those `usable` accepts and the number it rejected.
pub(crate) fn usable<'a, F>(records: &'a [ProductRecord], accept: F) -> (Vec<&'a ProductRecord>, usize)
where
    F: Fn(&ProductRecord) -> bool,
{
    let rows: Vec<&ProductRecord> = records.iter().filter(|r| accept(r)).collect();
    let excluded = records.len() - rows.len();
    (rows, excluded)
}

pub(crate) fn model_error(e: smartcore::error::Failed) -> PipelineError {
    PipelineError::Model(e.to_string())
}
