pub mod analysis;
pub mod api;
pub mod config;
pub mod db;
pub mod jobs;
pub mod logging;
pub mod offload;
pub mod uploads;

pub use analysis::{AnalysisError, DocumentAnalyzer};
pub use config::Config;
