pub mod analytics;
pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod scrapers;
pub mod table;
pub mod types;

pub use config::Config;
pub use error::{PipelineError, Result};
