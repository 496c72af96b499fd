use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants;
use crate::error::{PipelineError, Result};
use crate::table::InputEncoding;

/// Top-level configuration, read from `config.toml`.
///
/// Every section falls back to built-in defaults, so a partial file only needs to
/// name the values it changes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub brands: BrandConfig,
    pub scraper: ScraperConfig,
    pub enrich: EnrichConfig,
    pub analytics: AnalyticsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw: PathBuf,
    pub cleaned: PathBuf,
    pub normalized: PathBuf,
    pub enriched: PathBuf,
    pub clusters: PathBuf,
    pub predictions: PathBuf,
    pub filtered: PathBuf,
    pub report: PathBuf,
    /// Encoding of the tables read by the cleaning stages
    pub input_encoding: InputEncoding,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw: constants::RAW_TABLE.into(),
            cleaned: constants::CLEAN_TABLE.into(),
            normalized: constants::NORMALIZED_TABLE.into(),
            enriched: constants::ENRICHED_TABLE.into(),
            clusters: constants::CLUSTER_TABLE.into(),
            predictions: constants::PREDICTION_TABLE.into(),
            filtered: constants::FILTERED_TABLE.into(),
            report: constants::REPORT_FILE.into(),
            input_encoding: InputEncoding::Utf8,
        }
    }
}

/// Brand stopwords and manual spelling corrections
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    pub stopwords: Vec<String>,
    pub corrections: BTreeMap<String, String>,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            stopwords: constants::DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            corrections: constants::DEFAULT_CORRECTIONS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub source_name: String,
    pub base_url: String,
    pub items_per_page: usize,
    pub max_pages: usize,
    pub delay_ms: u64,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            source_name: constants::JUMBO_SOURCE.to_string(),
            base_url: constants::JUMBO_BASE_URL.to_string(),
            items_per_page: constants::ITEMS_PER_PAGE,
            max_pages: constants::MAX_PAGES,
            delay_ms: 2000,
            timeout_seconds: 30,
            user_agent: format!("coffee_insights/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeRule {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Products whose name contains one of these words are dropped (milk, creamer)
    pub exclude_keywords: Vec<String>,
    pub types: Vec<TypeRule>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            exclude_keywords: constants::DEFAULT_EXCLUDE_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            types: constants::DEFAULT_TYPE_RULES
                .iter()
                .map(|(name, keywords)| TypeRule {
                    name: name.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub clusters: usize,
    pub seed: u64,
    pub test_size: f32,
    pub histogram_bins: usize,
    pub top_brands: usize,
    /// Encoding of the enriched table read by the analytics commands
    pub input_encoding: InputEncoding,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            clusters: 3,
            seed: constants::DEFAULT_SEED,
            test_size: 0.2,
            histogram_bins: 30,
            top_brands: 10,
            input_encoding: InputEncoding::Utf8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// When set, the Prometheus text rendering is written here after each command
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file; a missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML file, using built-in defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scraper.items_per_page == 0 {
            return Err(PipelineError::Config(
                "scraper.items_per_page must be positive".into(),
            ));
        }
        if self.analytics.clusters < 2 {
            return Err(PipelineError::Config(format!(
                "analytics.clusters must be at least 2, got {}",
                self.analytics.clusters
            )));
        }
        if !(self.analytics.test_size > 0.0 && self.analytics.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "analytics.test_size must be between 0 and 1, got {}",
                self.analytics.test_size
            )));
        }
        if self.analytics.histogram_bins == 0 {
            return Err(PipelineError::Config(
                "analytics.histogram_bins must be positive".into(),
            ));
        }
        Ok(())
    }
}
