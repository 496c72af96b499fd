use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use coffee_insights::analytics::cluster::{self, ClusterParams, FeatureMode};
use coffee_insights::analytics::dashboard::{self, DashboardFilter, DashboardParams};
use coffee_insights::analytics::regression::{self, RegressionParams};
use coffee_insights::config::Config;
use coffee_insights::observability::{init_logging, metrics};
use coffee_insights::pipeline::{CleanReport, EnrichReport, NormalizeReport, Pipeline};
use coffee_insights::scrapers::{self, HtmlDirSource, HttpListingSource, ProductSource};

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser)]
#[command(name = "coffee_insights")]
#[command(about = "Supermarket coffee and tea price scraper and analysis")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config.toml when present)
    #[arg(long, global = true, env = "COFFEE_INSIGHTS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract product listings into the raw table
    Scrape {
        /// Read saved *.html listing pages from this directory instead of the web
        #[arg(long)]
        from_dir: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Coerce prices, drop duplicates and stopword brands
    Clean {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Canonicalize and correct brands
    Normalize {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Derive quantity, type and unit price; drop milk and creamer
    Enrich {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run clean, normalize and enrich in sequence
    Run {
        /// Scrape the live listing first
        #[arg(long)]
        scrape: bool,
    },
    /// Segment products with k-means
    Cluster {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Features::QuantityShare)]
        features: Features,
    },
    /// Fit the unit price regression and write test-set predictions
    Predict {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build the market report
    Report {
        #[arg(long)]
        input: Option<PathBuf>,
        /// JSON report destination
        #[arg(long)]
        output: Option<PathBuf>,
        /// Filtered table destination
        #[arg(long)]
        filtered: Option<PathBuf>,
        /// Product type, or "All"
        #[arg(long = "type")]
        product_type: Option<String>,
        /// Brand, or "All"
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Features {
    QuantityShare,
    LogQuantity,
}

impl From<Features> for FeatureMode {
    fn from(features: Features) -> Self {
        match features {
            Features::QuantityShare => FeatureMode::QuantityShare,
            Features::LogQuantity => FeatureMode::LogQuantity,
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG))
            .context("failed to load config.toml"),
    }
}

fn pick(path: Option<PathBuf>, default: &Path) -> PathBuf {
    path.unwrap_or_else(|| default.to_path_buf())
}

fn scrape(config: &Config, from_dir: Option<PathBuf>, output: &Path) -> anyhow::Result<()> {
    let source: Box<dyn ProductSource> = match from_dir {
        Some(dir) => Box::new(
            HtmlDirSource::new(&dir)
                .with_context(|| format!("failed to open saved pages in {}", dir.display()))?,
        ),
        None => Box::new(
            HttpListingSource::new(&config.scraper).context("failed to build HTTP client")?,
        ),
    };

    let result = scrapers::run_scrape(source.as_ref(), output).context("scrape failed")?;
    println!("\n📊 Scrape results for {}:", result.source);
    println!("   Pages requested: {}", result.pages_requested);
    println!("   Pages failed: {}", result.pages_failed);
    println!("   Items skipped: {}", result.items_skipped);
    println!("   Products: {}", result.products);
    println!("   Output file: {}", result.output_file);
    if result.pages_failed > 0 {
        warn!("{} pages could not be fetched", result.pages_failed);
    }
    Ok(())
}

fn print_clean(report: &CleanReport, output: &Path) {
    println!("🧹 Cleaned: {} -> {} rows", report.rows_in, report.rows_out);
    println!("   Malformed prices: {}", report.malformed_prices);
    println!("   Duplicates removed: {}", report.duplicates_removed);
    println!("   Stopword brands removed: {}", report.stopword_rows_removed);
    println!("   Output file: {}", output.display());
}

fn print_normalize(report: &NormalizeReport, output: &Path) {
    println!("🏷️  Normalized: {} -> {} rows", report.rows_in, report.rows_out);
    if report.brand_derived_from_name {
        println!("   Brand derived from product name");
    }
    println!("   Stopword brands removed: {}", report.stopword_rows_removed);
    println!("   Brands corrected: {}", report.brands_corrected);
    println!("   Output file: {}", output.display());
}

fn print_enrich(report: &EnrichReport, output: &Path) {
    println!("🧮 Enriched: {} -> {} rows", report.rows_in, report.rows_out);
    println!("   Excluded (milk, creamer): {}", report.excluded);
    println!("   Missing quantity: {}", report.quantity_missing);
    println!("   Missing type: {}", report.type_missing);
    println!("   Missing unit price: {}", report.unit_price_missing);
    println!("   Output file: {}", output.display());
}

fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let paths = &config.paths;
    let analytics = &config.analytics;

    match cli.command {
        Commands::Scrape { from_dir, output } => {
            println!("🔄 Scraping product listings...");
            scrape(config, from_dir, &pick(output, &paths.raw))?;
        }
        Commands::Clean { input, output } => {
            let (input, output) = (pick(input, &paths.raw), pick(output, &paths.cleaned));
            let report = Pipeline::from_config(config)
                .clean(&input, &output)
                .context("clean stage failed")?;
            print_clean(&report, &output);
        }
        Commands::Normalize { input, output } => {
            let (input, output) = (pick(input, &paths.cleaned), pick(output, &paths.normalized));
            let report = Pipeline::from_config(config)
                .normalize(&input, &output)
                .context("normalize stage failed")?;
            print_normalize(&report, &output);
        }
        Commands::Enrich { input, output } => {
            let (input, output) = (pick(input, &paths.normalized), pick(output, &paths.enriched));
            let report = Pipeline::from_config(config)
                .enrich(&input, &output)
                .context("enrich stage failed")?;
            print_enrich(&report, &output);
        }
        Commands::Run { scrape: with_scrape } => {
            println!("🚀 Running full pipeline...");
            if with_scrape {
                println!("\n📥 Step 0: Scraping...");
                scrape(config, None, &paths.raw)?;
            }
            let result = Pipeline::from_config(config)
                .run_all(config)
                .context("pipeline failed")?;
            println!();
            print_clean(&result.clean, &paths.cleaned);
            print_normalize(&result.normalize, &paths.normalized);
            print_enrich(&result.enrich, &paths.enriched);
            println!("✅ Full pipeline completed successfully!");
        }
        Commands::Cluster {
            input,
            output,
            features,
        } => {
            let (input, output) = (pick(input, &paths.enriched), pick(output, &paths.clusters));
            let params = ClusterParams::from_config(analytics, features.into());
            let report = cluster::run_cluster(&input, &output, analytics.input_encoding, &params)
                .context("clustering failed")?;
            println!("🧰 Clustered {} products ({} excluded)", report.rows_used, report.rows_excluded);
            for (i, size) in report.sizes.iter().enumerate() {
                println!("   Cluster {}: {}", i + 1, size);
            }
            println!("   Output file: {}", output.display());
        }
        Commands::Predict { input, output } => {
            let (input, output) = (pick(input, &paths.enriched), pick(output, &paths.predictions));
            let report = regression::run_predict(
                &input,
                &output,
                analytics.input_encoding,
                &RegressionParams::from(analytics),
            )
            .context("price prediction failed")?;
            println!("✅ Price Prediction Model Results:");
            match report.r2 {
                Some(r2) => println!("   R² score: {:.2}", r2),
                None => println!("   R² score: n/a"),
            }
            println!("   Mean Squared Error: {:.5}", report.mse);
            println!("   Train/test rows: {}/{}", report.train_rows, report.test_rows);
            println!("   Output file: {}", output.display());
        }
        Commands::Report {
            input,
            output,
            filtered,
            product_type,
            brand,
            min_price,
            max_price,
        } => {
            let input = pick(input, &paths.enriched);
            let output = pick(output, &paths.report);
            let filtered = pick(filtered, &paths.filtered);
            let filter = DashboardFilter {
                product_type: DashboardFilter::selection(product_type),
                brand: DashboardFilter::selection(brand),
                min_price,
                max_price,
            };
            let report = dashboard::run_report(
                &input,
                &output,
                &filtered,
                analytics.input_encoding,
                &filter,
                &DashboardParams::from(analytics),
            )
            .context("report failed")?;
            print!("{}", report);
            println!("\n📂 Report: {}", output.display());
            println!("📂 Filtered data: {}", filtered.display());
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let _guard = init_logging(&config.logging.dir);
    metrics::init();
    info!("coffee_insights {} starting", env!("CARGO_PKG_VERSION"));

    let outcome = run(cli, &config);

    if let Some(path) = &config.metrics.snapshot_path {
        if let Err(e) = metrics::write_snapshot(path) {
            warn!("Failed to write metrics snapshot: {}", e);
        }
    }
    outcome
}
