pub mod app_config;
pub mod catalog;
pub mod config;
pub mod normalize;
pub mod package;
pub mod scoring;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use catalog::{CanonicalProduct, FlyerOffer, ListItem, MigrationEligibility, OfferOrigin};
pub use config::{load_app_config, load_app_config_from_env};
pub use normalize::normalize_text;
pub use package::{parse_package_size, PackageSize, SizeUnit};
pub use scoring::{load_scoring, ScoringConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read scoring file {path}: {source}")]
    ScoringFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scoring file: {0}")]
    ScoringFileParse(#[from] serde_yaml::Error),

    #[error("scoring validation failed: {0}")]
    Validation(String),
}
