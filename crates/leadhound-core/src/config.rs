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
/// Decoupled from the real environment so tests can drive it from a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    // Empty strings count as unset so `FOO=` in a .env file disables a feature.
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
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

    let env = parse_environment(&or_default("LEADHOUND_ENV", "development"));
    let bind_addr = parse("LEADHOUND_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("LEADHOUND_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("LEADHOUND_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("LEADHOUND_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("LEADHOUND_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let reddit_client_id = optional("REDDIT_CLIENT_ID");
    let reddit_client_secret = optional("REDDIT_CLIENT_SECRET");
    let reddit_user_agent = or_default("REDDIT_USER_AGENT", "leadhound/0.1 (lead-discovery)");
    let connector_timeout_secs = parse_u64("LEADHOUND_CONNECTOR_TIMEOUT_SECS", "30")?;

    let llm_api_key = optional("LEADHOUND_LLM_API_KEY");
    let llm_base_url = or_default("LEADHOUND_LLM_BASE_URL", "https://api.openai.com/v1");
    let llm_model = or_default("LEADHOUND_LLM_MODEL", "gpt-4o-mini");
    let llm_timeout_secs = parse_u64("LEADHOUND_LLM_TIMEOUT_SECS", "90")?;

    let max_concurrent_runs = parse_usize("LEADHOUND_MAX_CONCURRENT_RUNS", "2")?;
    if max_concurrent_runs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "LEADHOUND_MAX_CONCURRENT_RUNS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let step_max_retries = parse_u32("LEADHOUND_STEP_MAX_RETRIES", "2")?;
    let step_backoff_base_ms = parse_u64("LEADHOUND_STEP_BACKOFF_BASE_MS", "1000")?;

    let notify_webhook_url = optional("LEADHOUND_NOTIFY_WEBHOOK_URL");
    let notify_api_key = optional("LEADHOUND_NOTIFY_API_KEY");
    let dashboard_url = or_default("LEADHOUND_DASHBOARD_URL", "http://localhost:3000/dashboard");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        reddit_client_id,
        reddit_client_secret,
        reddit_user_agent,
        connector_timeout_secs,
        llm_api_key,
        llm_base_url,
        llm_model,
        llm_timeout_secs,
        max_concurrent_runs,
        step_max_retries,
        step_backoff_base_ms,
        notify_webhook_url,
        notify_api_key,
        dashboard_url,
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
