// Cleaning pipeline: price coercion, dedup, brand canonicalization, enrichment

pub mod brand;
pub mod clean;
pub mod corrections;
pub mod dedupe;
pub mod enrich;
pub mod normalize;
pub mod price;
pub mod stopwords;

pub use brand::{derive_brand, normalize_brand};
pub use clean::{clean_table, CleanReport};
pub use corrections::{apply_corrections, BrandCorrections};
pub use dedupe::dedupe;
pub use enrich::{enrich_table, EnrichReport, EnrichRules};
pub use normalize::{normalize_table, NormalizeReport};
pub use price::coerce_price;
pub use stopwords::{filter_stopwords, StopwordSet};

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::table::InputEncoding;

/// Result of chaining clean -> normalize -> enrich
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub clean: CleanReport,
    pub normalize: NormalizeReport,
    pub enrich: EnrichReport,
}

/// The cleaning stages with their configuration resolved once
pub struct Pipeline {
    stopwords: StopwordSet,
    corrections: BrandCorrections,
    rules: EnrichRules,
    encoding: InputEncoding,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Self {
        let stopwords = StopwordSet::new(&config.brands.stopwords);
        let corrections = BrandCorrections::new(&config.brands.corrections);
        info!(
            stopwords = stopwords.len(),
            corrections = corrections.len(),
            "Brand configuration loaded"
        );
        Self {
            stopwords,
            corrections,
            rules: EnrichRules::from_config(&config.enrich),
            encoding: config.paths.input_encoding,
        }
    }

    pub fn clean(&self, input: &Path, output: &Path) -> Result<CleanReport> {
        clean::run_clean(input, output, self.encoding, &self.stopwords)
    }

    pub fn normalize(&self, input: &Path, output: &Path) -> Result<NormalizeReport> {
        normalize::run_normalize(
            input,
            output,
            self.encoding,
            &self.stopwords,
            &self.corrections,
        )
    }

    /// Enrichment reads what the pipeline itself wrote, which is always UTF-8.
    pub fn enrich(&self, input: &Path, output: &Path) -> Result<EnrichReport> {
        enrich::run_enrich(input, output, InputEncoding::Utf8, &self.rules)
    }

    /// Run clean, normalize and enrich over the configured paths.
    pub fn run_all(&self, config: &Config) -> Result<PipelineResult> {
        let paths = &config.paths;
        let clean = self.clean(&paths.raw, &paths.cleaned)?;
        // normalize consumes the freshly cleaned file, which is UTF-8
        let normalize = normalize::run_normalize(
            &paths.cleaned,
            &paths.normalized,
            InputEncoding::Utf8,
            &self.stopwords,
            &self.corrections,
        )?;
        let enrich = self.enrich(&paths.normalized, &paths.enriched)?;
        Ok(PipelineResult {
            clean,
            normalize,
            enrich,
        })
    }
}
