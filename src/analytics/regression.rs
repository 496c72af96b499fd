//! Ordinary least squares model of unit price from pack size and product type.

use csv::QuoteStyle;
use serde::Serialize;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use smartcore::model_selection::train_test_split;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use super::{clean_text, model_error, usable};
use crate::config::AnalyticsConfig;
use crate::constants::{COL_QUANTITY, COL_TYPE, COL_UNIT_PRICE};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::table::{write_rows, InputEncoding, ProductTable};
use crate::types::ProductRecord;

#[derive(Debug, Clone, Copy)]
pub struct RegressionParams {
    /// Fraction of rows held out for evaluation
    pub test_size: f32,
    pub seed: u64,
}

impl From<&AnalyticsConfig> for RegressionParams {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            test_size: config.test_size,
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionReport {
    pub rows_used: usize,
    pub rows_excluded: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub features: Vec<String>,
    /// Type absorbed into the intercept
    pub baseline_type: Option<String>,
    /// Missing when the test targets have no variance
    pub r2: Option<f64>,
    pub mse: f64,
}

#[derive(Debug, Clone)]
pub struct RegressionOutcome {
    pub report: RegressionReport,
    /// `(actual, predicted)` for every test row
    pub predictions: Vec<(f64, f64)>,
}

fn is_modellable(record: &ProductRecord) -> bool {
    record.unit_price.is_some_and(f64::is_finite)
        && record.quantity.is_some_and(f64::is_finite)
        && record.product_type.is_some()
}

/// Quantity plus one indicator per type except the first in sorted order.
fn design_matrix(rows: &[&ProductRecord]) -> (Vec<String>, Option<String>, Vec<Vec<f64>>) {
    let types: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.product_type.as_deref())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let (baseline, encoded) = match types.split_first() {
        Some((first, rest)) => (Some(first.to_string()), rest.to_vec()),
        None => (None, Vec::new()),
    };

    let mut features = vec![COL_QUANTITY.to_string()];
    features.extend(encoded.iter().map(|t| format!("type_{}", t)));

    let x = rows
        .iter()
        .map(|r| {
            let mut row = vec![r.quantity.unwrap_or_default()];
            row.extend(encoded.iter().map(|t| {
                if r.product_type.as_deref() == Some(*t) {
                    1.0
                } else {
                    0.0
                }
            }));
            row
        })
        .collect();

    (features, baseline, x)
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() {
        return None;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Fit the model on a seeded train split and evaluate it on the held-out rows.
pub fn fit_regression(records: &[ProductRecord], params: &RegressionParams) -> Result<RegressionOutcome> {
    let (rows, rows_excluded) = usable(records, is_modellable);
    let (features, baseline_type, x) = design_matrix(&rows);

    let n = rows.len();
    let test_rows = (n as f32 * params.test_size) as usize;
    if n < features.len() + 2 || test_rows == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "{} usable rows for {} features",
            n,
            features.len()
        )));
    }

    let y: Vec<f64> = rows.iter().filter_map(|r| r.unit_price).collect();
    let x = DenseMatrix::from_2d_vec(&x);
    let (x_train, x_test, y_train, y_test) =
        train_test_split(&x, &y, params.test_size, true, Some(params.seed));

    let model = LinearRegression::fit(
        &x_train,
        &y_train,
        LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD),
    )
    .map_err(model_error)?;
    let predicted: Vec<f64> = model.predict(&x_test).map_err(model_error)?;

    let report = RegressionReport {
        rows_used: n,
        rows_excluded,
        train_rows: y_train.len(),
        test_rows: y_test.len(),
        features,
        baseline_type,
        r2: r2_score(&y_test, &predicted),
        mse: mean_squared_error(&y_test, &predicted),
    };
    Ok(RegressionOutcome {
        report,
        predictions: y_test.into_iter().zip(predicted).collect(),
    })
}

/// Fit the model on the enriched table at `input` and write `actual;predicted` rows.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run_predict(
    input: &Path,
    output: &Path,
    encoding: InputEncoding,
    params: &RegressionParams,
) -> Result<RegressionReport> {
    let started = Instant::now();
    let (mut table, stats) = ProductTable::load(input, encoding)?;
    table.require_columns(
        &[COL_UNIT_PRICE, COL_QUANTITY, COL_TYPE],
        &input.display().to_string(),
    )?;
    metrics::table::loaded(&stats);

    clean_text(&mut table.records);
    let outcome = fit_regression(&table.records, params)?;

    let headers = vec!["actual".to_string(), "predicted".to_string()];
    let rows = outcome
        .predictions
        .iter()
        .map(|(actual, predicted)| [actual.to_string(), predicted.to_string()]);
    write_rows(output, &headers, rows, QuoteStyle::Necessary)?;

    let report = outcome.report;
    metrics::analytics::rows("predict", report.rows_used, report.rows_excluded);
    metrics::table::written(report.test_rows);
    metrics::stage_duration("predict", started.elapsed().as_secs_f64());
    info!(
        r2 = ?report.r2,
        mse = report.mse,
        train_rows = report.train_rows,
        test_rows = report.test_rows,
        "Price prediction model fitted"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(quantity: f64, product_type: &str, unit_price: f64) -> ProductRecord {
        let mut record = ProductRecord::new(format!("{} {}", product_type, quantity), None);
        record.quantity = Some(quantity);
        record.product_type = Some(product_type.to_string());
        record.unit_price = Some(unit_price);
        record
    }

    /// unit_price = 0.02 - 0.00001 * quantity + type offset
    fn linear_products() -> Vec<ProductRecord> {
        let offsets = [("beans", 0.0), ("capsules", 0.3), ("ground", 0.005)];
        let mut records = Vec::new();
        for (i, (name, offset)) in offsets.iter().cycle().take(30).enumerate() {
            let quantity = 100.0 + 37.0 * i as f64;
            records.push(product(quantity, name, 0.02 - 0.00001 * quantity + offset));
        }
        records
    }

    fn params() -> RegressionParams {
        RegressionParams {
            test_size: 0.2,
            seed: 42,
        }
    }

    #[test]
    fn test_exact_linear_relation_is_recovered() {
        let outcome = fit_regression(&linear_products(), &params()).unwrap();
        let report = &outcome.report;

        assert_eq!(report.rows_used, 30);
        assert_eq!(report.test_rows, 6);
        assert_eq!(report.train_rows, 24);
        assert_eq!(report.baseline_type.as_deref(), Some("beans"));
        assert_eq!(report.features, vec!["quantity", "type_capsules", "type_ground"]);
        assert!(report.mse < 1e-10, "mse = {}", report.mse);
        assert!(report.r2.unwrap() > 0.999);
        assert_eq!(outcome.predictions.len(), 6);
    }

    #[test]
    fn test_split_is_reproducible() {
        let a = fit_regression(&linear_products(), &params()).unwrap();
        let b = fit_regression(&linear_products(), &params()).unwrap();
        let actual = |o: &RegressionOutcome| o.predictions.iter().map(|p| p.0).collect::<Vec<_>>();
        assert_eq!(actual(&a), actual(&b));
    }

    #[test]
    fn test_rows_without_type_are_excluded() {
        let mut records = linear_products();
        records.push(ProductRecord::new("Onbekend", Some(2.0)));
        let report = fit_regression(&records, &params()).unwrap().report;
        assert_eq!(report.rows_excluded, 1);
    }

    #[test]
    fn test_insufficient_rows() {
        let records = vec![product(250.0, "beans", 0.02), product(10.0, "capsules", 0.4)];
        let err = fit_regression(&records, &params()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }

    #[test]
    fn test_metrics() {
        assert_eq!(mean_squared_error(&[1.0, 3.0], &[2.0, 3.0]), 0.5);
        assert_eq!(r2_score(&[1.0, 3.0], &[1.0, 3.0]), Some(1.0));
        assert_eq!(r2_score(&[2.0, 2.0], &[1.0, 3.0]), None);
    }
}
