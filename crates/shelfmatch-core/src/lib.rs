mod app_config;
mod config;
mod items;
mod matches;
mod retailers;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use items::{BoundingBox, DetectedItem, ExtractedField, ItemMetadata};
pub use matches::{
    CandidateProduct, ClassifiedCandidate, MatchStage, MatchStrategy, MatchTier, ScoredCandidate,
    SelectedMatch, SelectionMethod,
};
pub use retailers::{load_retailers, RetailerConfig, RetailerRegistry, RetailersFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read retailers file {path}: {source}")]
    RetailersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse retailers file: {0}")]
    RetailersFileParse(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid match tier: {0}")]
    InvalidTier(String),
    #[error("invalid match stage: {0}")]
    InvalidStage(String),
    #[error("invalid match strategy: {0}")]
    InvalidStrategy(String),
    #[error("invalid selection method: {0}")]
    InvalidMethod(String),
}
