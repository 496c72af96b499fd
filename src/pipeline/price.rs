//! Price coercion.
//!
//! Scraped prices arrive as text such as `"3,99"`, `"€ 4.29"` or `"€ 3,-"`. Coercion
//! never fails: anything that does not parse to a finite number becomes `None`.

use crate::types::ProductRecord;

/// Coerce a raw price cell to a finite float, or `None` when it cannot be parsed.
pub fn coerce_price(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .trim_start_matches('€')
        .trim_end_matches('€')
        .trim();
    if cleaned.is_empty() {
        return None;
    }

    cleaned
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Re-apply coercion to values that were already loaded; returns how many rows had
/// a price that was not finite and has been replaced by the missing marker.
pub fn coerce_prices(records: &mut [ProductRecord]) -> usize {
    let mut coerced = 0;
    for record in records.iter_mut() {
        if let Some(price) = record.price {
            if !price.is_finite() {
                record.price = None;
                coerced += 1;
            }
        }
    }
    coerced
}
