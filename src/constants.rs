/// Column names shared by every stage of the pipeline
pub const COL_NAME: &str = "name";
pub const COL_PRICE: &str = "price";
pub const COL_PAGE: &str = "page";
pub const COL_BRAND: &str = "brand";
pub const COL_QUANTITY: &str = "quantity";
pub const COL_TYPE: &str = "type";
pub const COL_UNIT_PRICE: &str = "unit_price";
pub const COL_CLUSTER: &str = "cluster";

/// Field delimiter used by every table the pipeline reads or writes
pub const DELIMITER: u8 = b';';

// Default stage files
pub const RAW_TABLE: &str = "data/jumbo_prices.csv";
pub const CLEAN_TABLE: &str = "data/jumbo_prices_clean.csv";
pub const NORMALIZED_TABLE: &str = "data/coffee_final_cleaned_normalized.csv";
pub const ENRICHED_TABLE: &str = "data/coffee_final_cleaned_no_milk.csv";
pub const CLUSTER_TABLE: &str = "data/coffee_clusters.csv";
pub const PREDICTION_TABLE: &str = "data/price_predictions.csv";
pub const FILTERED_TABLE: &str = "data/coffee_filtered.csv";
pub const REPORT_FILE: &str = "reports/dashboard.json";

// Retailer listing defaults
pub const JUMBO_SOURCE: &str = "jumbo";
pub const JUMBO_BASE_URL: &str = "https://www.jumbo.com/producten/koffie-en-thee/?offSet=";
pub const ITEMS_PER_PAGE: usize = 24;
pub const MAX_PAGES: usize = 34;

/// Seed shared by clustering and the train/test split
pub const DEFAULT_SEED: u64 = 42;

/// Union of the brand stopwords used by the cleaning and normalization stages
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "van", "de", "het", "en", "coffee", "koffie", "the", "by", "voor", "met", "aan", "and",
    "of", "la", "le",
];

pub const DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    ("nescafe", "nescafé"),
    ("illy", "illy"),
    ("starbucks", "starbucks"),
];

pub const DEFAULT_EXCLUDE_KEYWORDS: &[&str] = &["melk", "milk", "creamer", "koffiemelk"];

/// Ordered product type rules; the first rule with a matching keyword wins
pub const DEFAULT_TYPE_RULES: &[(&str, &[&str])] = &[
    ("capsules", &["capsule", "cups", "cup", "nespresso", "dolce gusto", "tassimo"]),
    ("pads", &["pads", "pad", "senseo"]),
    ("beans", &["bonen", "beans", "boon"]),
    ("ground", &["snelfilter", "filterkoffie", "filter", "gemalen", "ground"]),
    ("instant", &["oploskoffie", "oplos", "instant", "sticks"]),
    ("tea", &["thee", "tea", "rooibos", "chai"]),
];

