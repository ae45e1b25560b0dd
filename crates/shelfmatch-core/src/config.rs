use crate::app_config::{AppConfig, Environment};
use crate::{ConfigError, MatchStrategy};

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::str::FromStr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;
    let catalog_base_url = require("SHELFMATCH_CATALOG_API_URL")?;
    let vision_base_url = require("SHELFMATCH_VISION_API_URL")?;

    let env = parse_environment(&or_default("SHELFMATCH_ENV", "development"));

    let bind_addr = parse_addr("SHELFMATCH_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("SHELFMATCH_LOG_LEVEL", "info");
    let retailers_path = PathBuf::from(or_default(
        "SHELFMATCH_RETAILERS_PATH",
        "./config/retailers.yaml",
    ));

    let catalog_api_key = lookup("SHELFMATCH_CATALOG_API_KEY").ok();
    let catalog_timeout_secs = parse_u64("SHELFMATCH_CATALOG_TIMEOUT_SECS", "30")?;
    let catalog_search_limit = parse_u32("SHELFMATCH_CATALOG_SEARCH_LIMIT", "25")?;

    let vision_api_key = lookup("SHELFMATCH_VISION_API_KEY").ok();
    let vision_timeout_secs = parse_u64("SHELFMATCH_VISION_TIMEOUT_SECS", "60")?;

    let db_max_connections = parse_u32("SHELFMATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SHELFMATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SHELFMATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let match_max_concurrent_items = parse_usize("SHELFMATCH_MATCH_MAX_CONCURRENT_ITEMS", "3")?;
    let raw_strategy = or_default("SHELFMATCH_MATCH_STRATEGY", "tiered");
    let match_strategy =
        MatchStrategy::from_str(&raw_strategy).map_err(|e| ConfigError::InvalidEnvVar {
            var: "SHELFMATCH_MATCH_STRATEGY".to_string(),
            reason: e.to_string(),
        })?;
    let match_max_retries = parse_u32("SHELFMATCH_MATCH_MAX_RETRIES", "3")?;
    let match_retry_backoff_base_ms = parse_u64("SHELFMATCH_MATCH_RETRY_BACKOFF_BASE_MS", "1000")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        retailers_path,
        catalog_base_url,
        catalog_api_key,
        catalog_timeout_secs,
        catalog_search_limit,
        vision_base_url,
        vision_api_key,
        vision_timeout_secs,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        match_max_concurrent_items,
        match_strategy,
        match_max_retries,
        match_retry_backoff_base_ms,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
