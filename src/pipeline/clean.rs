use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use super::brand::derive_brand;
use super::dedupe::dedupe;
use super::price::coerce_prices;
use super::stopwords::{filter_stopwords, StopwordSet};
use crate::constants::{COL_BRAND, COL_NAME, COL_PRICE};
use crate::error::Result;
use crate::observability::metrics;
use crate::table::{InputEncoding, ProductTable};

/// Counts reported by the cleaning stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub rows_in: usize,
    /// Price cells that were present but unparseable, now missing
    pub malformed_prices: usize,
    pub duplicates_removed: usize,
    pub stopword_rows_removed: usize,
    pub rows_out: usize,
}

/// Coerce prices, drop exact `(name, price)` duplicates, derive the brand and drop
/// rows whose brand is a stopword.
///
/// `rows_out == rows_in - duplicates_removed - stopword_rows_removed` always holds.
pub fn clean_table(table: &mut ProductTable, stopwords: &StopwordSet) -> CleanReport {
    let rows_in = table.len();
    let malformed_prices = coerce_prices(&mut table.records);

    let duplicates_removed = dedupe(&mut table.records);
    info!("Removed {} duplicates", duplicates_removed);

    let use_existing = table.has_column(COL_BRAND);
    derive_brand(&mut table.records, use_existing);
    table.ensure_column(COL_BRAND);

    let stopword_rows_removed = filter_stopwords(&mut table.records, stopwords);
    info!("Removed {} rows with invalid brands", stopword_rows_removed);

    CleanReport {
        rows_in,
        malformed_prices,
        duplicates_removed,
        stopword_rows_removed,
        rows_out: table.len(),
    }
}

/// Run the cleaning stage from `input` to `output`.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run_clean(
    input: &Path,
    output: &Path,
    encoding: InputEncoding,
    stopwords: &StopwordSet,
) -> Result<CleanReport> {
    let started = Instant::now();
    let (mut table, stats) = ProductTable::load(input, encoding)?;
    table.require_columns(&[COL_NAME, COL_PRICE], &input.display().to_string())?;
    metrics::table::loaded(&stats);

    let mut report = clean_table(&mut table, stopwords);
    report.malformed_prices += stats.malformed_in(COL_PRICE);

    table.save(output)?;

    metrics::table::written(report.rows_out);
    metrics::clean::duplicates_removed(report.duplicates_removed);
    metrics::clean::stopword_rows_removed(report.stopword_rows_removed);
    metrics::stage_duration("clean", started.elapsed().as_secs_f64());
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        malformed_prices = report.malformed_prices,
        "Cleaning finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_STOPWORDS;
    use crate::types::ProductRecord;

    fn stopwords() -> StopwordSet {
        StopwordSet::new(DEFAULT_STOPWORDS)
    }

    #[test]
    fn test_clean_derives_brand_and_filters() {
        let mut table = ProductTable::new(
            &["name", "price", "page"],
            vec![
                ProductRecord::new("Van Nelle Supra Koffie 500g", Some(5.49)),
                ProductRecord::new("Douwe Egberts Aroma Rood 500g", Some(5.99)),
                ProductRecord::new("Douwe Egberts Aroma Rood 500g", Some(5.99)),
                ProductRecord::new("Nescafé Gold 200g", Some(8.99)),
                ProductRecord::new("Koffie Verkeerd Sticks", None),
            ],
        );
        let report = clean_table(&mut table, &stopwords());

        assert_eq!(report.rows_in, 5);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.stopword_rows_removed, 2);
        assert_eq!(report.rows_out, 2);
        assert_eq!(table.columns().last().map(String::as_str), Some("brand"));
        let brands: Vec<_> = table.records.iter().map(|r| r.brand.clone()).collect();
        assert_eq!(
            brands,
            vec![Some("douwe".to_string()), Some("nescafe".to_string())]
        );
    }

    #[test]
    fn test_case_variants_both_survive() {
        let (mut table, _) = ProductTable::parse(
            "name;price\n\"Douwe Egberts Koffie\";\"3,99\"\ndouwe egberts koffie;3.99\n",
            "test",
        )
        .unwrap();
        let report = clean_table(&mut table, &stopwords());
        assert_eq!(report.duplicates_removed, 0);
        assert_eq!(table.len(), 2);
        assert!(table.records.iter().all(|r| r.price == Some(3.99)));
    }

    #[test]
    fn test_unparseable_price_is_retained_as_missing() {
        let (mut table, stats) =
            ProductTable::parse("name;price\nLavazza Oro;€ 3,-\n", "test").unwrap();
        let report = clean_table(&mut table, &stopwords());
        assert_eq!(stats.malformed_in("price"), 1);
        assert_eq!(report.rows_out, 1);
        assert_eq!(table.records[0].price, None);
    }

    #[test]
    fn test_existing_brand_column_is_used() {
        let mut table = ProductTable::new(
            &["name", "price", "brand"],
            vec![ProductRecord::new("De Klok Koffie", Some(2.0)).with_brand("De Klok")],
        );
        let report = clean_table(&mut table, &stopwords());
        assert_eq!(report.stopword_rows_removed, 0);
        assert_eq!(table.records[0].brand.as_deref(), Some("de klok"));
        assert_eq!(table.columns().len(), 3);
    }

    #[test]
    fn test_empty_table() {
        let mut table = ProductTable::new(&["name", "price"], vec![]);
        let report = clean_table(&mut table, &stopwords());
        assert_eq!(report, CleanReport::default());
        assert!(table.is_empty());
    }
}
