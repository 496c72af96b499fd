//! K-means segmentation of products by pack size and unit price.

use serde::Serialize;
use smartcore::cluster::kmeans::{KMeans, KMeansParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use super::{clean_text, model_error, usable};
use crate::config::AnalyticsConfig;
use crate::constants::{COL_CLUSTER, COL_QUANTITY, COL_UNIT_PRICE};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::table::{InputEncoding, ProductTable};
use crate::types::ProductRecord;

/// How a product is turned into a feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureMode {
    /// `[unit_price, quantity / max(quantity)]`
    QuantityShare,
    /// `[ln(1 + quantity), unit_price]`
    LogQuantity,
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub k: usize,
    pub seed: u64,
    pub mode: FeatureMode,
}

impl ClusterParams {
    pub fn from_config(config: &AnalyticsConfig, mode: FeatureMode) -> Self {
        Self {
            k: config.clusters,
            seed: config.seed,
            mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterReport {
    pub rows_used: usize,
    pub rows_excluded: usize,
    /// Number of products per cluster; index 0 is cluster 1
    pub sizes: Vec<usize>,
}

pub(crate) fn is_clusterable(record: &ProductRecord) -> bool {
    matches!(
        (record.unit_price, record.quantity),
        (Some(p), Some(q)) if p.is_finite() && q.is_finite()
    )
}

fn features(rows: &[&ProductRecord], mode: FeatureMode) -> Vec<Vec<f64>> {
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| Some((r.unit_price?, r.quantity?)))
        .collect();

    match mode {
        FeatureMode::QuantityShare => {
            let max_quantity = pairs.iter().map(|&(_, q)| q).fold(f64::MIN, f64::max);
            pairs
                .iter()
                .map(|&(price, quantity)| {
                    let share = if max_quantity > 0.0 {
                        quantity / max_quantity
                    } else {
                        0.0
                    };
                    vec![price, share]
                })
                .collect()
        }
        FeatureMode::LogQuantity => pairs
            .iter()
            .map(|&(price, quantity)| vec![quantity.max(0.0).ln_1p(), price])
            .collect(),
    }
}

/// Fit k-means on rows that all carry unit price and quantity; labels are 1-based.
pub fn fit_labels(rows: &[&ProductRecord], params: &ClusterParams) -> Result<Vec<usize>> {
    if rows.len() < params.k {
        return Err(PipelineError::InsufficientData(format!(
            "{} usable rows for {} clusters",
            rows.len(),
            params.k
        )));
    }

    let x = DenseMatrix::from_2d_vec(&features(rows, params.mode));
    let mut parameters = KMeansParameters::default().with_k(params.k);
    parameters.seed = Some(params.seed);

    let model: KMeans<f64, i32, DenseMatrix<f64>, Vec<i32>> =
        KMeans::fit(&x, parameters).map_err(model_error)?;
    let labels = model.predict(&x).map_err(model_error)?;

    Ok(labels.into_iter().map(|l| l.max(0) as usize + 1).collect())
}

/// Count products per 1-based cluster label.
pub fn cluster_sizes(labels: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0; k];
    for &label in labels {
        if let Some(size) = label.checked_sub(1).and_then(|i| sizes.get_mut(i)) {
            *size += 1;
        }
    }
    sizes
}

/// Label every usable row of the table; rows missing unit price or quantity get no cluster.
pub fn assign_clusters(table: &mut ProductTable, params: &ClusterParams) -> Result<ClusterReport> {
    let (rows, rows_excluded) = usable(&table.records, is_clusterable);
    let rows_used = rows.len();
    let labels = fit_labels(&rows, params)?;
    let sizes = cluster_sizes(&labels, params.k);

    let mut labels = labels.into_iter();
    for record in table.records.iter_mut() {
        record.cluster = if is_clusterable(record) {
            labels.next()
        } else {
            None
        };
    }
    table.ensure_column(COL_CLUSTER);

    Ok(ClusterReport {
        rows_used,
        rows_excluded,
        sizes,
    })
}

/// Cluster the enriched table at `input` and write it with a `cluster` column.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run_cluster(
    input: &Path,
    output: &Path,
    encoding: InputEncoding,
    params: &ClusterParams,
) -> Result<ClusterReport> {
    let started = Instant::now();
    let (mut table, stats) = ProductTable::load(input, encoding)?;
    table.require_columns(&[COL_UNIT_PRICE, COL_QUANTITY], &input.display().to_string())?;
    metrics::table::loaded(&stats);

    clean_text(&mut table.records);
    let report = assign_clusters(&mut table, params)?;
    table.save(output)?;

    metrics::analytics::rows("cluster", report.rows_used, report.rows_excluded);
    metrics::table::written(table.len());
    metrics::stage_duration("cluster", started.elapsed().as_secs_f64());
    info!(
        rows_used = report.rows_used,
        rows_excluded = report.rows_excluded,
        sizes = ?report.sizes,
        "Clustering finished"
    );
    Ok(report)
}
