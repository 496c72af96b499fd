//! Unit price enrichment.
//!
//! Derives `quantity`, `type` and `unit_price` from the product name and price so
//! that products of different pack sizes can be compared, and drops products that
//! are not coffee or tea (milk, creamer).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::brand::transliterate;
use super::price::coerce_price;
use crate::config::EnrichConfig;
use crate::constants::{COL_NAME, COL_PRICE, COL_QUANTITY, COL_TYPE, COL_UNIT_PRICE};
use crate::error::Result;
use crate::observability::metrics;
use crate::table::{InputEncoding, ProductTable};
use crate::types::ProductRecord;

const UNITS: &str = r"kg|gram|gr|g|ml|cl|liter|l|stuks|stuk|st|cups|capsules|pads|zakjes";

static MULTIPACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d+)\s*[x×]\s*(\d+(?:[.,]\d+)?)\s*({UNITS})\b"
    ))
    .expect("multipack pattern is valid")
});

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(\d+(?:[.,]\d+)?)\s*({UNITS})\b"))
        .expect("amount pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuantityUnit {
    Grams,
    Millilitres,
    Pieces,
}

/// Pack size in base units (grams, millilitres or pieces)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantity {
    pub amount: f64,
    pub unit: QuantityUnit,
}

fn to_base_unit(amount: f64, unit: &str) -> Quantity {
    let unit = unit.to_lowercase();
    match unit.as_str() {
        "kg" => Quantity { amount: amount * 1000.0, unit: QuantityUnit::Grams },
        "g" | "gr" | "gram" => Quantity { amount, unit: QuantityUnit::Grams },
        "l" | "liter" => Quantity { amount: amount * 1000.0, unit: QuantityUnit::Millilitres },
        "cl" => Quantity { amount: amount * 10.0, unit: QuantityUnit::Millilitres },
        "ml" => Quantity { amount, unit: QuantityUnit::Millilitres },
        _ => Quantity { amount, unit: QuantityUnit::Pieces },
    }
}

/// Parse the pack size from a product name: `"2 x 250g"`, `"500 gram"`, `"10 stuks"`.
pub fn parse_quantity(name: &str) -> Option<Quantity> {
    let quantity = if let Some(caps) = MULTIPACK_RE.captures(name) {
        let count: f64 = caps[1].parse().ok()?;
        let size = coerce_price(&caps[2])?;
        let mut quantity = to_base_unit(size, &caps[3]);
        quantity.amount *= count;
        quantity
    } else {
        let caps = AMOUNT_RE.captures(name)?;
        to_base_unit(coerce_price(&caps[1])?, &caps[2])
    };

    (quantity.amount > 0.0).then_some(quantity)
}

/// Keyword rules for product type, plus the exclusion list
#[derive(Debug, Clone, Default)]
pub struct EnrichRules {
    exclude_keywords: Vec<String>,
    types: Vec<(String, Vec<String>)>,
}

impl EnrichRules {
    pub fn from_config(config: &EnrichConfig) -> Self {
        let normalize = |s: &str| transliterate(s).to_lowercase();
        Self {
            exclude_keywords: config
                .exclude_keywords
                .iter()
                .map(|k| normalize(k.as_str()))
                .filter(|k| !k.is_empty())
                .collect(),
            types: config
                .types
                .iter()
                .map(|rule| {
                    (
                        rule.name.clone(),
                        rule.keywords.iter().map(|k| normalize(k.as_str())).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        let name = transliterate(name).to_lowercase();
        self.exclude_keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// First type whose keyword appears in the name
    pub fn classify_type(&self, name: &str) -> Option<&str> {
        let name = transliterate(name).to_lowercase();
        self.types
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k.as_str())))
            .map(|(type_name, _)| type_name.as_str())
    }
}

/// Counts reported by the enrichment stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichReport {
    pub rows_in: usize,
    pub excluded: usize,
    pub quantity_missing: usize,
    pub type_missing: usize,
    pub unit_price_missing: usize,
    pub rows_out: usize,
}

fn enrich_record(record: &mut ProductRecord, rules: &EnrichRules) {
    if record.quantity.is_none() {
        record.quantity = parse_quantity(&record.name).map(|q| q.amount);
    }
    if record.product_type.is_none() {
        record.product_type = rules.classify_type(&record.name).map(str::to_string);
    }
    if record.unit_price.is_none() {
        record.unit_price = match (record.price, record.quantity) {
            (Some(price), Some(quantity)) if quantity > 0.0 => Some(price / quantity),
            _ => None,
        };
    }
}

/// Drop excluded products and fill in quantity, type and unit price.
pub fn enrich_table(table: &mut ProductTable, rules: &EnrichRules) -> EnrichReport {
    let rows_in = table.len();
    table.records.retain(|record| {
        let excluded = rules.is_excluded(&record.name);
        if excluded {
            debug!(name = %record.name, "excluding product");
        }
        !excluded
    });
    let excluded = rows_in - table.len();

    for record in table.records.iter_mut() {
        enrich_record(record, rules);
    }
    for column in [COL_QUANTITY, COL_TYPE, COL_UNIT_PRICE] {
        table.ensure_column(column);
    }

    let missing = |f: fn(&ProductRecord) -> bool| table.records.iter().filter(|r| f(r)).count();
    EnrichReport {
        rows_in,
        excluded,
        quantity_missing: missing(|r| r.quantity.is_none()),
        type_missing: missing(|r| r.product_type.is_none()),
        unit_price_missing: missing(|r| r.unit_price.is_none()),
        rows_out: table.len(),
    }
}

/// Run the enrichment stage from `input` to `output`.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run_enrich(
    input: &Path,
    output: &Path,
    encoding: InputEncoding,
    rules: &EnrichRules,
) -> Result<EnrichReport> {
    let started = Instant::now();
    let (mut table, stats) = ProductTable::load(input, encoding)?;
    table.require_columns(&[COL_NAME, COL_PRICE], &input.display().to_string())?;
    metrics::table::loaded(&stats);

    let report = enrich_table(&mut table, rules);
    table.save(output)?;

    metrics::table::written(report.rows_out);
    metrics::enrich::rows_excluded(report.excluded);
    metrics::enrich::quantity_missing(report.quantity_missing);
    metrics::enrich::type_missing(report.type_missing);
    metrics::stage_duration("enrich", started.elapsed().as_secs_f64());
    info!(
        rows_out = report.rows_out,
        excluded = report.excluded,
        unit_price_missing = report.unit_price_missing,
        "Enrichment finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> EnrichRules {
        EnrichRules::from_config(&EnrichConfig::default())
    }

    fn grams(amount: f64) -> Option<Quantity> {
        Some(Quantity { amount, unit: QuantityUnit::Grams })
    }

    #[test]
    fn test_parse_weights() {
        assert_eq!(parse_quantity("Douwe Egberts Aroma Rood 500g"), grams(500.0));
        assert_eq!(parse_quantity("Lavazza Qualita Oro 250 gram"), grams(250.0));
        assert_eq!(parse_quantity("Jumbo Koffiebonen 1 kg"), grams(1000.0));
        assert_eq!(parse_quantity("Pickwick Thee 20 x 1,5g"), grams(30.0));
        assert_eq!(parse_quantity("Douwe Egberts 2 x 250 gram"), grams(500.0));
    }

    #[test]
    fn test_parse_counts_and_volumes() {
        assert_eq!(
            parse_quantity("L'OR Espresso Koffiecups 20 Stuks"),
            Some(Quantity { amount: 20.0, unit: QuantityUnit::Pieces })
        );
        assert_eq!(
            parse_quantity("Cold Brew Koffie 1,5L"),
            Some(Quantity { amount: 1500.0, unit: QuantityUnit::Millilitres })
        );
        assert_eq!(
            parse_quantity("Ijskoffie 25cl"),
            Some(Quantity { amount: 250.0, unit: QuantityUnit::Millilitres })
        );
    }

    #[test]
    fn test_parse_rejects_missing_or_zero() {
        assert_eq!(parse_quantity("Nescafé Gold"), None);
        assert_eq!(parse_quantity("Koffie 0g"), None);
        assert_eq!(parse_quantity("Nescafé 3in1"), None);
    }

    #[test]
    fn test_classify_type() {
        let rules = rules();
        assert_eq!(rules.classify_type("L'OR Espresso Koffiecups 20 Stuks"), Some("capsules"));
        assert_eq!(rules.classify_type("Senseo Classic Koffiepads 36 stuks"), Some("pads"));
        assert_eq!(rules.classify_type("Jumbo Koffiebonen 1 kg"), Some("beans"));
        assert_eq!(rules.classify_type("Douwe Egberts Snelfiltermaling 500g"), Some("ground"));
        assert_eq!(rules.classify_type("Nescafé Oploskoffie 200g"), Some("instant"));
        assert_eq!(rules.classify_type("Pickwick Thee Earl Grey 20 zakjes"), Some("tea"));
        assert_eq!(rules.classify_type("Chocomel"), None);
    }

    #[test]
    fn test_exclusion() {
        let rules = rules();
        assert!(rules.is_excluded("Friesche Vlag Koffiemelk 930ml"));
        assert!(rules.is_excluded("Coffee Creamer Poeder"));
        assert!(!rules.is_excluded("Douwe Egberts Aroma Rood 500g"));
    }

    #[test]
    fn test_enrich_table_computes_unit_price() {
        let mut table = ProductTable::new(
            &["name", "price", "brand"],
            vec![
                ProductRecord::new("Douwe Egberts Aroma Rood Snelfilter 500g", Some(6.0)),
                ProductRecord::new("Friesche Vlag Koffiemelk 930ml", Some(2.0)),
                ProductRecord::new("Nescafé Gold Oploskoffie", Some(8.99)),
                ProductRecord::new("Senseo Pads 36 stuks", None),
            ],
        );
        let report = enrich_table(&mut table, &rules());

        assert_eq!(report.rows_in, 4);
        assert_eq!(report.excluded, 1);
        assert_eq!(report.rows_out, 3);
        assert_eq!(report.quantity_missing, 1);
        assert_eq!(report.unit_price_missing, 2);
        assert_eq!(report.type_missing, 0);

        let first = &table.records[0];
        assert_eq!(first.quantity, Some(500.0));
        assert_eq!(first.product_type.as_deref(), Some("ground"));
        assert!((first.unit_price.unwrap() - 0.012).abs() < 1e-12);
        assert_eq!(
            table.columns(),
            &["name", "price", "brand", "quantity", "type", "unit_price"]
        );
    }

    #[test]
    fn test_existing_values_are_kept() {
        let mut record = ProductRecord::new("Lavazza 250g", Some(5.0));
        record.quantity = Some(1000.0);
        record.product_type = Some("beans".into());
        let mut table = ProductTable::new(&["name", "price", "quantity", "type"], vec![record]);
        enrich_table(&mut table, &rules());
        assert_eq!(table.records[0].quantity, Some(1000.0));
        assert_eq!(table.records[0].product_type.as_deref(), Some("beans"));
        assert_eq!(table.records[0].unit_price, Some(0.005));
    }
}
