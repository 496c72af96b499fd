//! Brand derivation and canonicalization.

use deunicode::deunicode;

use crate::types::ProductRecord;

const APOSTROPHES: &[char] = &['\'', '\u{2019}', '\u{2018}', '`'];

/// Canonical brand form: transliterated to ASCII, lowercased, apostrophes removed,
/// surrounding whitespace trimmed.
///
/// `normalize_brand(&normalize_brand(b)) == normalize_brand(b)` for every input.
pub fn normalize_brand(brand: &str) -> String {
    deunicode(brand)
        .to_lowercase()
        .replace(APOSTROPHES, "")
        .trim()
        .to_string()
}

/// Transliterate free text (product names, types) without changing case.
pub fn transliterate(text: &str) -> String {
    deunicode(text)
}

/// First whitespace token of the lowercased, trimmed name.
pub fn brand_from_name(name: &str) -> Option<String> {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Fill in the canonical brand of every record.
///
/// With `use_existing` the record's own brand value is the source (the table had a
/// brand column); otherwise the brand is taken from the name. Empty names or brand
/// cells give a missing brand.
pub fn derive_brand(records: &mut [ProductRecord], use_existing: bool) {
    for record in records.iter_mut() {
        let source = if use_existing {
            record.brand.take()
        } else {
            brand_from_name(&record.name)
        };
        record.brand = source
            .map(|b| normalize_brand(&b))
            .filter(|b| !b.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_accents_and_case() {
        assert_eq!(normalize_brand("Nescafé"), "nescafe");
        assert_eq!(normalize_brand("  Café Noir "), "cafe noir");
        assert_eq!(normalize_brand("Löfbergs"), "lofbergs");
    }

    #[test]
    fn test_normalize_removes_apostrophes() {
        assert_eq!(normalize_brand("L'OR"), "lor");
        assert_eq!(normalize_brand("L\u{2019}Or"), "lor");
        assert_eq!(normalize_brand("' illy"), "illy");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Nescafé",
            "L'OR",
            "  Douwe Egberts ",
            "Æble",
            "ÇAFÉ",
            "Pickwick\u{2019}s",
            "",
            "'",
            "straße",
            "咖啡",
        ];
        for s in samples {
            let once = normalize_brand(s);
            assert_eq!(normalize_brand(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_brand_from_name() {
        assert_eq!(brand_from_name("Van Nelle Supra 500g").as_deref(), Some("van"));
        assert_eq!(brand_from_name("  Douwe Egberts Aroma").as_deref(), Some("douwe"));
        assert_eq!(brand_from_name(""), None);
        assert_eq!(brand_from_name("   "), None);
    }

    #[test]
    fn test_derive_from_name() {
        let mut records = vec![
            ProductRecord::new("Nescafé Gold 200g", Some(8.99)),
            ProductRecord::new("", Some(1.0)),
        ];
        derive_brand(&mut records, false);
        assert_eq!(records[0].brand.as_deref(), Some("nescafe"));
        assert_eq!(records[1].brand, None);
    }

    #[test]
    fn test_derive_uses_existing_column() {
        let mut records = vec![
            ProductRecord::new("Café Royal Lungo", Some(3.5)).with_brand("Café Royal"),
            ProductRecord::new("Anything", Some(3.5)).with_brand("  "),
        ];
        derive_brand(&mut records, true);
        assert_eq!(records[0].brand.as_deref(), Some("cafe royal"));
        assert_eq!(records[1].brand, None);
    }
}
