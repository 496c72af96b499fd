use std::collections::HashMap;

use super::brand::normalize_brand;
use crate::types::ProductRecord;

/// Manual spelling fixes applied to canonical brands, e.g. `nescafe -> nescafé`.
///
/// Keys are canonicalized on construction; values are used verbatim.
#[derive(Debug, Clone, Default)]
pub struct BrandCorrections {
    map: HashMap<String, String>,
}

impl BrandCorrections {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (normalize_brand(k.as_ref()), v.into()))
            .collect();
        Self { map }
    }

    /// Correction for an exact canonical brand, if one is configured.
    pub fn lookup(&self, brand: &str) -> Option<&str> {
        self.map.get(brand).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Replace brands that exactly match a correction key. Returns how many rows changed.
pub fn apply_corrections(records: &mut [ProductRecord], corrections: &BrandCorrections) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        if let Some(brand) = record.brand.as_mut() {
            match corrections.lookup(brand) {
                Some(fixed) if fixed != brand.as_str() => {
                    *brand = fixed.to_string();
                    changed += 1;
                }
                _ => {}
            }
        }
    }
    changed
}
