use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

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
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real process environment so it can be tested with a
/// plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("FLYERWISE_ENV", "development"));
    let bind_addr = parse_addr("FLYERWISE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("FLYERWISE_LOG_LEVEL", "info");
    let scoring_path = lookup("FLYERWISE_SCORING_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    let db_max_connections = parse_u32("FLYERWISE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("FLYERWISE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("FLYERWISE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let session_ttl_secs = parse_u64("FLYERWISE_SESSION_TTL_SECS", "1800")?;
    if session_ttl_secs == 0 {
        return Err(invalid(
            "FLYERWISE_SESSION_TTL_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let completed_retention_secs = parse_u64("FLYERWISE_COMPLETED_RETENTION_SECS", "86400")?;
    let purge_cron = or_default("FLYERWISE_PURGE_CRON", "0 */15 * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        scoring_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        session_ttl_secs,
        completed_retention_secs,
        purge_cron,
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
