use std::net::SocketAddr;
use std::path::PathBuf;

use crate::MatchStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub retailers_path: PathBuf,
    pub catalog_base_url: String,
    pub catalog_api_key: Option<String>,
    pub catalog_timeout_secs: u64,
    pub catalog_search_limit: u32,
    pub vision_base_url: String,
    pub vision_api_key: Option<String>,
    pub vision_timeout_secs: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub match_max_concurrent_items: usize,
    pub match_strategy: MatchStrategy,
    pub match_max_retries: u32,
    pub match_retry_backoff_base_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("retailers_path", &self.retailers_path)
            .field("database_url", &"[redacted]")
            .field("catalog_base_url", &self.catalog_base_url)
            .field(
                "catalog_api_key",
                &self.catalog_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("catalog_timeout_secs", &self.catalog_timeout_secs)
            .field("catalog_search_limit", &self.catalog_search_limit)
            .field("vision_base_url", &self.vision_base_url)
            .field(
                "vision_api_key",
                &self.vision_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("vision_timeout_secs", &self.vision_timeout_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "match_max_concurrent_items",
                &self.match_max_concurrent_items,
            )
            .field("match_strategy", &self.match_strategy)
            .field("match_max_retries", &self.match_max_retries)
            .field(
                "match_retry_backoff_base_ms",
                &self.match_retry_backoff_base_ms,
            )
            .finish()
    }
}
