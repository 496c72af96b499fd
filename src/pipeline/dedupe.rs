use std::collections::HashSet;

use crate::types::ProductRecord;

/// Remove rows that repeat an earlier `(name, price)` pair, keeping the first one.
///
/// Names compare exactly (case-sensitive). Two missing prices count as equal.
/// Returns the number of rows removed.
pub fn dedupe(records: &mut Vec<ProductRecord>) -> usize {
    let before = records.len();
    let mut seen: HashSet<(String, Option<u64>)> = HashSet::with_capacity(before);
    records.retain(|record| seen.insert(dedupe_key(record)));
    before - records.len()
}

fn dedupe_key(record: &ProductRecord) -> (String, Option<u64>) {
    // -0.0 and 0.0 are the same price
    let price = record
        .price
        .map(|p| if p == 0.0 { 0.0f64.to_bits() } else { p.to_bits() });
    (record.name.clone(), price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, price: Option<f64>) -> ProductRecord {
        ProductRecord::new(name, price)
    }

    #[test]
    fn test_keeps_first_occurrence_in_order() {
        let mut records = vec![
            rec("Douwe Egberts Aroma Rood 500g", Some(5.99)),
            rec("Lavazza Qualita Oro 250g", Some(4.49)),
            rec("Douwe Egberts Aroma Rood 500g", Some(5.99)),
            rec("Lavazza Qualita Oro 250g", Some(3.99)),
        ];
        records[2].page = Some(7);

        assert_eq!(dedupe(&mut records), 1);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].page, None);
        assert_eq!(records[2].price, Some(3.99));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut records = vec![
            rec("Douwe Egberts Koffie", Some(3.99)),
            rec("douwe egberts koffie", Some(3.99)),
        ];
        assert_eq!(dedupe(&mut records), 0);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_prices_collapse() {
        let mut records = vec![rec("Pickwick Thee", None), rec("Pickwick Thee", None)];
        assert_eq!(dedupe(&mut records), 1);
    }

    #[test]
    fn test_no_duplicate_pairs_survive() {
        let mut records: Vec<ProductRecord> = (0..40)
            .map(|i| rec(&format!("item {}", i % 7), Some((i % 3) as f64)))
            .collect();
        let input = records.clone();
        let removed = dedupe(&mut records);

        let mut keys = HashSet::new();
        for r in &records {
            assert!(keys.insert((r.name.clone(), r.price.map(f64::to_bits))));
            assert!(input.iter().any(|i| i.name == r.name && i.price == r.price));
        }
        assert_eq!(records.len() + removed, input.len());
        assert_eq!(records.len(), 21);
    }

    #[test]
    fn test_empty_input() {
        let mut records = Vec::new();
        assert_eq!(dedupe(&mut records), 0);
    }
}
