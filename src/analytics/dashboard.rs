//! Market overview report over the enriched table.
//!
//! The report is computed once for a filter selection and written three ways: a JSON
//! document, a plain-text summary for the terminal and the filtered rows as a table.

use chrono::Local;
use csv::QuoteStyle;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::cluster::{cluster_sizes, fit_labels, is_clusterable, ClusterParams, FeatureMode};
use super::regression::{fit_regression, RegressionParams};
use crate::config::AnalyticsConfig;
use crate::constants::{COL_BRAND, COL_NAME, COL_TYPE, COL_UNIT_PRICE};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::brand::transliterate;
use crate::table::{write_atomic, write_rows, InputEncoding, ProductTable};
use crate::types::ProductRecord;

/// Selection applied before any section is computed.
///
/// `None` (or `"All"` on the command line) means no restriction. The price bounds
/// default to the observed unit price range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardFilter {
    pub product_type: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl DashboardFilter {
    /// Treat `"All"` the same as no selection.
    pub fn selection(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().eq_ignore_ascii_case("all"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DashboardParams {
    pub clusters: usize,
    pub seed: u64,
    pub test_size: f32,
    pub histogram_bins: usize,
    pub top_brands: usize,
}

impl From<&AnalyticsConfig> for DashboardParams {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            clusters: config.clusters,
            seed: config.seed,
            test_size: config.test_size,
            histogram_bins: config.histogram_bins,
            top_brands: config.top_brands,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFilter {
    #[serde(rename = "type")]
    pub product_type: String,
    pub brand: String,
    pub min_unit_price: Option<f64>,
    pub max_unit_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub product_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRow {
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub brand: Option<String>,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeStats {
    #[serde(rename = "type")]
    pub product_type: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Share of the filtered products, in percent
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandPrice {
    pub brand: String,
    pub mean_unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub sizes: Vec<usize>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub features: Vec<String>,
    pub target: String,
    pub r2: Option<f64>,
    pub mse: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub generated_at: String,
    pub source: String,
    pub total_products: usize,
    pub type_counts: Vec<TypeCount>,
    pub filter: AppliedFilter,
    pub filtered_products: usize,
    pub products: Vec<ProductRow>,
    pub type_stats: Vec<TypeStats>,
    /// Types ordered by mean unit price, most expensive first
    pub price_by_type: Vec<TypeStats>,
    pub most_expensive_brands: Vec<BrandPrice>,
    pub cheapest_brands: Vec<BrandPrice>,
    pub histogram: Vec<HistogramBin>,
    pub clusters: ClusterSummary,
    pub model: ModelSummary,
}

fn is_missing_type(product_type: &str) -> bool {
    product_type.is_empty() || product_type.eq_ignore_ascii_case("nan")
}

/// Transliterate names and types and drop rows without a usable type.
pub fn prepare(records: Vec<ProductRecord>) -> Vec<ProductRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            record.name = transliterate(&record.name);
            let product_type = transliterate(record.product_type.as_deref()?).trim().to_string();
            if is_missing_type(&product_type) {
                return None;
            }
            record.product_type = Some(product_type);
            Some(record)
        })
        .collect()
}

fn observed_range(records: &[ProductRecord]) -> Option<(f64, f64)> {
    records
        .iter()
        .filter_map(|r| r.unit_price)
        .filter(|p| p.is_finite())
        .fold(None, |range, p| match range {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
}

/// Rows matching the filter; rows without a unit price never pass the range check.
pub fn apply_filter<'a>(
    records: &'a [ProductRecord],
    filter: &DashboardFilter,
) -> (Vec<&'a ProductRecord>, AppliedFilter) {
    let observed = observed_range(records);
    let min = filter.min_price.or(observed.map(|r| r.0));
    let max = filter.max_price.or(observed.map(|r| r.1));

    let rows = records
        .iter()
        .filter(|r| match &filter.product_type {
            Some(t) => r.product_type.as_deref() == Some(t.as_str()),
            None => true,
        })
        .filter(|r| match &filter.brand {
            Some(b) => r.brand.as_deref() == Some(b.as_str()),
            None => true,
        })
        .filter(|r| match r.unit_price {
            Some(p) if p.is_finite() => {
                min.map_or(true, |lo| p >= lo) && max.map_or(true, |hi| p <= hi)
            }
            _ => false,
        })
        .collect();

    let applied = AppliedFilter {
        product_type: filter.product_type.clone().unwrap_or_else(|| "All".into()),
        brand: filter.brand.clone().unwrap_or_else(|| "All".into()),
        min_unit_price: min,
        max_unit_price: max,
    };
    (rows, applied)
}

/// The filtered rows, cheapest unit price first, with the bounds that produced them
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub rows: Vec<&'a ProductRecord>,
    pub applied: AppliedFilter,
}

pub fn select<'a>(records: &'a [ProductRecord], filter: &DashboardFilter) -> Selection<'a> {
    let (mut rows, applied) = apply_filter(records, filter);
    rows.sort_by(|a, b| unit_price(a).total_cmp(&unit_price(b)));
    Selection { rows, applied }
}

/// Per-type counts, largest first; ties keep alphabetical order.
pub fn type_counts(records: &[ProductRecord]) -> Vec<TypeCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        if let Some(t) = record.product_type.as_deref() {
            *counts.entry(t).or_default() += 1;
        }
    }
    let mut counts: Vec<TypeCount> = counts
        .into_iter()
        .map(|(t, count)| TypeCount {
            product_type: t.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

fn unit_price(record: &ProductRecord) -> f64 {
    record.unit_price.unwrap_or(f64::NAN)
}

/// Mean, min and max unit price per type, alphabetical by type.
pub fn type_stats(rows: &[&ProductRecord]) -> Vec<TypeStats> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let (Some(t), Some(p)) = (row.product_type.as_deref(), row.unit_price) {
            groups.entry(t).or_default().push(p);
        }
    }
    let total: usize = groups.values().map(Vec::len).sum();

    groups
        .into_iter()
        .map(|(t, prices)| TypeStats {
            product_type: t.to_string(),
            count: prices.len(),
            mean: prices.iter().sum::<f64>() / prices.len() as f64,
            min: prices.iter().copied().fold(f64::INFINITY, f64::min),
            max: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            percentage: 100.0 * prices.len() as f64 / total as f64,
        })
        .collect()
}

/// Mean unit price per brand, most expensive first.
pub fn brand_means(rows: &[&ProductRecord]) -> Vec<BrandPrice> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in rows {
        if let (Some(b), Some(p)) = (row.brand.as_deref(), row.unit_price) {
            let entry = groups.entry(b).or_default();
            entry.0 += p;
            entry.1 += 1;
        }
    }
    let mut means: Vec<BrandPrice> = groups
        .into_iter()
        .map(|(brand, (sum, n))| BrandPrice {
            brand: brand.to_string(),
            mean_unit_price: sum / n as f64,
        })
        .collect();
    means.sort_by(|a, b| b.mean_unit_price.total_cmp(&a.mean_unit_price));
    means
}

/// Equal-width histogram between the smallest and largest value.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (Some(lo), Some(hi)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };
    if bins == 0 {
        return Vec::new();
    }
    if hi == lo {
        return vec![HistogramBin {
            lower: lo,
            upper: hi,
            count: values.len(),
        }];
    }

    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0; bins];
    for v in &values {
        // the maximum belongs to the last bin
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + width * i as f64,
            upper: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

fn cluster_summary(rows: &[&ProductRecord], params: &DashboardParams) -> ClusterSummary {
    let rows: Vec<&ProductRecord> = rows.iter().copied().filter(|r| is_clusterable(r)).collect();
    let cluster_params = ClusterParams {
        k: params.clusters,
        seed: params.seed,
        mode: FeatureMode::LogQuantity,
    };
    match fit_labels(&rows, &cluster_params) {
        Ok(labels) => ClusterSummary {
            sizes: cluster_sizes(&labels, params.clusters),
            note: None,
        },
        Err(PipelineError::InsufficientData(_)) => ClusterSummary {
            sizes: Vec::new(),
            note: Some("Not enough data for clustering.".into()),
        },
        Err(e) => {
            warn!("Clustering failed: {}", e);
            ClusterSummary {
                sizes: Vec::new(),
                note: Some(format!("Clustering failed: {}", e)),
            }
        }
    }
}

fn model_summary(records: &[ProductRecord], params: &DashboardParams) -> ModelSummary {
    let regression_params = RegressionParams {
        test_size: params.test_size,
        seed: params.seed,
    };
    let mut summary = ModelSummary {
        model: "Linear Regression".into(),
        features: vec!["quantity".into(), "type".into()],
        target: COL_UNIT_PRICE.into(),
        r2: None,
        mse: None,
        note: None,
    };
    match fit_regression(records, &regression_params) {
        Ok(outcome) => {
            summary.r2 = outcome.report.r2;
            summary.mse = Some(outcome.report.mse);
        }
        Err(e) => summary.note = Some(e.to_string()),
    }
    summary
}

/// Compute every report section for prepared records.
///
/// The model summary is fitted on all prepared records, the other sections on the
/// selection.
pub fn build_report(
    records: &[ProductRecord],
    selection: &Selection<'_>,
    params: &DashboardParams,
    source: &str,
) -> DashboardReport {
    let rows = &selection.rows;
    let type_stats = type_stats(rows);
    let mut price_by_type = type_stats.clone();
    price_by_type.sort_by(|a, b| b.mean.total_cmp(&a.mean));

    let brands = brand_means(rows);
    let most_expensive_brands: Vec<BrandPrice> =
        brands.iter().take(params.top_brands).cloned().collect();
    let cheapest_brands: Vec<BrandPrice> =
        brands.iter().rev().take(params.top_brands).cloned().collect();

    let prices: Vec<f64> = rows.iter().filter_map(|r| r.unit_price).collect();

    DashboardReport {
        generated_at: Local::now().to_rfc3339(),
        source: source.to_string(),
        total_products: records.len(),
        type_counts: type_counts(records),
        filter: selection.applied.clone(),
        filtered_products: rows.len(),
        products: rows
            .iter()
            .map(|r| ProductRow {
                name: r.name.clone(),
                product_type: r.product_type.clone().unwrap_or_default(),
                brand: r.brand.clone(),
                unit_price: unit_price(r),
            })
            .collect(),
        type_stats,
        price_by_type,
        most_expensive_brands,
        cheapest_brands,
        histogram: histogram(&prices, params.histogram_bins),
        clusters: cluster_summary(rows, params),
        model: model_summary(records, params),
    }
}

fn fmt_option(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "n/a".into())
}

/// Plain-text rendering of the report for the terminal.
impl fmt::Display for DashboardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Coffee market report ({})", self.source)?;
        writeln!(f, "Total products: {}", self.total_products)?;
        for tc in &self.type_counts {
            writeln!(f, "  - {}: {}", tc.product_type, tc.count)?;
        }

        let applied = &self.filter;
        writeln!(
            f,
            "\nFilter: type={} brand={} unit_price=[{}, {}]",
            applied.product_type,
            applied.brand,
            fmt_option(applied.min_unit_price, 4),
            fmt_option(applied.max_unit_price, 4)
        )?;
        writeln!(f, "Filtered products: {}", self.filtered_products)?;

        writeln!(f, "\nUnit price by type (mean / min / max, share):")?;
        for s in &self.type_stats {
            writeln!(
                f,
                "  {:<12} {:.4} / {:.4} / {:.4}  {:.1}%",
                s.product_type, s.mean, s.min, s.max, s.percentage
            )?;
        }

        writeln!(f, "\nAverage unit price by type:")?;
        for s in &self.price_by_type {
            writeln!(f, "  {:<12} {:.2}", s.product_type, s.mean)?;
        }

        writeln!(f, "\nMost expensive brands:")?;
        for b in &self.most_expensive_brands {
            writeln!(f, "  {:<24} {:.3}", b.brand, b.mean_unit_price)?;
        }
        writeln!(f, "\nCheapest brands:")?;
        for b in &self.cheapest_brands {
            writeln!(f, "  {:<24} {:.3}", b.brand, b.mean_unit_price)?;
        }

        writeln!(f, "\nUnit price distribution:")?;
        for bin in self.histogram.iter().filter(|b| b.count > 0) {
            writeln!(f, "  [{:.4}, {:.4}] {}", bin.lower, bin.upper, bin.count)?;
        }

        writeln!(f, "\nClusters (quantity & unit price):")?;
        match &self.clusters.note {
            Some(note) => writeln!(f, "  {}", note)?,
            None => {
                let sizes: Vec<String> = self
                    .clusters
                    .sizes
                    .iter()
                    .enumerate()
                    .map(|(i, n)| format!("Cluster {}: {}", i + 1, n))
                    .collect();
                writeln!(f, "  {}", sizes.join(", "))?;
            }
        }

        let m = &self.model;
        writeln!(f, "\nPrice prediction ({}):", m.model)?;
        match &m.note {
            Some(note) => writeln!(f, "  {}", note),
            None => writeln!(
                f,
                "  R2 score: {}  MSE: {}",
                fmt_option(m.r2, 2),
                fmt_option(m.mse, 5)
            ),
        }
    }
}

/// Load the enriched table, build the report and write the JSON and filtered table.
#[instrument(skip_all, fields(input = %input.display()))]
pub fn run_report(
    input: &Path,
    report_path: &Path,
    filtered_path: &Path,
    encoding: InputEncoding,
    filter: &DashboardFilter,
    params: &DashboardParams,
) -> Result<DashboardReport> {
    let started = Instant::now();
    let (table, stats) = ProductTable::load(input, encoding)?;
    table.require_columns(
        &[COL_NAME, COL_TYPE, COL_BRAND, COL_UNIT_PRICE],
        &input.display().to_string(),
    )?;
    metrics::table::loaded(&stats);

    let columns = table.columns().to_vec();
    let rows_in = table.len();
    let records = prepare(table.records);
    let selection = select(&records, filter);
    let report = build_report(&records, &selection, params, &input.display().to_string());

    let json = serde_json::to_string_pretty(&report)?;
    let rows: Vec<Vec<String>> = selection
        .rows
        .iter()
        .map(|r| columns.iter().map(|c| r.field(c)).collect())
        .collect();

    // written last so a failed table write leaves no report
    write_rows(filtered_path, &columns, rows, QuoteStyle::Necessary)?;
    write_atomic(report_path, |partial| Ok(fs::write(partial, json)?))?;

    metrics::analytics::rows("report", report.filtered_products, rows_in - report.filtered_products);
    metrics::table::written(report.filtered_products);
    metrics::stage_duration("report", started.elapsed().as_secs_f64());
    info!(
        total = report.total_products,
        filtered = report.filtered_products,
        report = %report_path.display(),
        "Dashboard report written"
    );
    Ok(report)
}
