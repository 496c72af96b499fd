use std::collections::HashSet;

use tracing::debug;

use super::brand::normalize_brand;
use crate::types::ProductRecord;

/// Words that look like a brand when taken from the front of a product name
/// ("Van Nelle" -> "van") but are not one.
#[derive(Debug, Clone, Default)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl StopwordSet {
    /// Build the set; entries are canonicalized so matching ignores case and accents.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| normalize_brand(w.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn contains(&self, brand: &str) -> bool {
        self.words.contains(&normalize_brand(brand))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Drop every record whose brand is a stopword. Records without a brand are kept.
/// Returns the number of rows removed.
pub fn filter_stopwords(records: &mut Vec<ProductRecord>, stopwords: &StopwordSet) -> usize {
    let before = records.len();
    records.retain(|record| match record.brand.as_deref() {
        Some(brand) if stopwords.contains(brand) => {
            debug!(name = %record.name, brand, "dropping stopword brand");
            false
        }
        _ => true,
    });
    before - records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_STOPWORDS;

    fn set() -> StopwordSet {
        StopwordSet::new(DEFAULT_STOPWORDS)
    }

    #[test]
    fn test_matching_ignores_case_and_accents() {
        let stopwords = StopwordSet::new(["Café", "VAN"]);
        assert!(stopwords.contains("cafe"));
        assert!(stopwords.contains("van"));
        assert!(stopwords.contains(" Van "));
        assert!(!stopwords.contains("vanille"));
    }

    #[test]
    fn test_default_set_is_union_of_both_variants() {
        let stopwords = set();
        assert_eq!(stopwords.len(), 15);
        for word in ["het", "en", "voor", "met", "aan", "and", "of", "la", "le"] {
            assert!(stopwords.contains(word), "{word} missing");
        }
    }

    #[test]
    fn test_filter_removes_only_stopword_brands() {
        let mut records = vec![
            ProductRecord::new("Van Nelle Supra", Some(4.99)).with_brand("van"),
            ProductRecord::new("Douwe Egberts", Some(5.99)).with_brand("douwe"),
            ProductRecord::new("De Aardappel", Some(1.0)).with_brand("de"),
            ProductRecord::new("", None),
        ];
        let removed = filter_stopwords(&mut records, &set());
        assert_eq!(removed, 2);
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.brand.as_deref().map_or(true, |b| !set().contains(b))));
    }

    #[test]
    fn test_empty_set_keeps_everything() {
        let mut records = vec![ProductRecord::new("Van Nelle", None).with_brand("van")];
        assert_eq!(filter_stopwords(&mut records, &StopwordSet::default()), 0);
        assert_eq!(records.len(), 1);
    }
}
