pub mod config;
pub mod geo;
pub mod paths;
pub mod scoring;
pub mod text;
pub mod types;

pub use config::{load_config, AppConfig, FileConfig};
pub use geo::haversine_km;
pub use scoring::{popularity, PopularityCounts, PopularityWeights};
pub use text::{extract_mentions, trim_for_push};
pub use types::*;
