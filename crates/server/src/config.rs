//! Process configuration.
//!
//! `Settings` is loaded once at startup from environment variables
//! (optionally seeded from a `.env` file by `main`), then passed to every
//! component that needs it. Required variables fail fast with an error that
//! names the variable; nothing starts on a partial configuration.

use std::str::FromStr;

/// Configuration errors are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    MissingVariable { name: &'static str },

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,

    // Database (PostgreSQL)
    pub database_url: String,
    pub db_pool_size: u32,
    pub db_max_overflow: u32,

    // Redis (task broker + cache)
    pub redis_url: String,
    pub cache_ttl_ceidg_secs: u64,
    pub cache_ttl_research_secs: u64,

    // External service credentials
    pub ceidg_api_key: String,
    pub podio_app_id: String,
    pub podio_app_token: String,
    pub podio_workspace_id: String,
    pub podio_client_id: Option<String>,
    pub podio_secret_key: Option<String>,
    pub anthropic_api_key: String,
    pub perplexity_api_key: Option<String>,

    // Task queue. Both URLs default to `redis_url` when unset.
    pub task_broker_url: Option<String>,
    pub task_result_backend_url: Option<String>,
    pub task_time_limit_secs: u64,
    pub task_soft_time_limit_secs: u64,

    // LLM generation
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f64,
    pub llm_timeout_secs: u64,
    /// Retry ceiling for transient stage failures.
    pub llm_max_retries: u32,

    // Cost thresholds (USD)
    pub cost_alert_daily_usd: f64,
    pub cost_alert_per_plan_usd: f64,
    pub cost_target_per_plan_usd: f64,

    // Business plan generation
    pub biznesplan_target_pages: u32,
    pub biznesplan_min_sources: u32,
    /// Review/refine iteration ceiling.
    pub biznesplan_max_iterations: u32,
    pub biznesplan_quality_threshold: f64,

    pub log_level: String,
}

impl Settings {
    /// Load from the process environment.
    pub fn load() -> Result<Settings, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup. Lets tests inject a map
    /// instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings {
            app_name: string_or(&lookup, "APP_NAME", "Biznesplan Generator"),
            app_version: string_or(&lookup, "APP_VERSION", env!("CARGO_PKG_VERSION")),
            debug: parsed_or(&lookup, "DEBUG", false)?,

            database_url: required(&lookup, "DATABASE_URL")?,
            db_pool_size: parsed_or(&lookup, "DB_POOL_SIZE", 10)?,
            db_max_overflow: parsed_or(&lookup, "DB_MAX_OVERFLOW", 20)?,

            redis_url: string_or(&lookup, "REDIS_URL", "redis://localhost:6379/0"),
            cache_ttl_ceidg_secs: parsed_or(&lookup, "CACHE_TTL_CEIDG", 259_200)?,
            cache_ttl_research_secs: parsed_or(&lookup, "CACHE_TTL_RESEARCH", 604_800)?,

            ceidg_api_key: required(&lookup, "CEIDG_API_KEY")?,
            podio_app_id: required(&lookup, "PODIO_APP_ID")?,
            podio_app_token: required(&lookup, "PODIO_APP_TOKEN")?,
            podio_workspace_id: required(&lookup, "PODIO_WORKSPACE_ID")?,
            podio_client_id: optional(&lookup, "PODIO_CLIENT_ID"),
            podio_secret_key: optional(&lookup, "PODIO_SECRET_KEY"),
            anthropic_api_key: required(&lookup, "ANTHROPIC_API_KEY")?,
            perplexity_api_key: optional(&lookup, "PERPLEXITY_API_KEY"),

            task_broker_url: optional(&lookup, "TASK_BROKER_URL"),
            task_result_backend_url: optional(&lookup, "TASK_RESULT_BACKEND_URL"),
            task_time_limit_secs: parsed_or(&lookup, "TASK_TIME_LIMIT_SECS", 1800)?,
            task_soft_time_limit_secs: parsed_or(&lookup, "TASK_SOFT_TIME_LIMIT_SECS", 1500)?,

            llm_model: string_or(&lookup, "LLM_MODEL", "claude-sonnet-4-5-20241022"),
            llm_max_tokens: parsed_or(&lookup, "LLM_MAX_TOKENS", 8000)?,
            llm_temperature: parsed_or(&lookup, "LLM_TEMPERATURE", 0.7)?,
            llm_timeout_secs: parsed_or(&lookup, "LLM_TIMEOUT_SECS", 60)?,
            llm_max_retries: parsed_or(&lookup, "LLM_MAX_RETRIES", 3)?,

            cost_alert_daily_usd: parsed_or(&lookup, "COST_ALERT_DAILY_USD", 5.0)?,
            cost_alert_per_plan_usd: parsed_or(&lookup, "COST_ALERT_PER_PLAN_USD", 0.5)?,
            cost_target_per_plan_usd: parsed_or(&lookup, "COST_TARGET_PER_PLAN_USD", 0.3)?,

            biznesplan_target_pages: parsed_or(&lookup, "BIZNESPLAN_TARGET_PAGES", 27)?,
            biznesplan_min_sources: parsed_or(&lookup, "BIZNESPLAN_MIN_SOURCES", 3)?,
            biznesplan_max_iterations: parsed_or(&lookup, "BIZNESPLAN_MAX_ITERATIONS", 3)?,
            biznesplan_quality_threshold: parsed_or(&lookup, "BIZNESPLAN_QUALITY_THRESHOLD", 0.85)?,

            log_level: string_or(&lookup, "LOG_LEVEL", "info"),
        };
        settings.derive_queue_urls();
        Ok(settings)
    }

    /// Default the task queue URLs to the Redis URL when unset.
    ///
    /// Runs once after base loading. Idempotent: a field that already holds
    /// a value (explicit or previously derived) is left untouched.
    pub fn derive_queue_urls(&mut self) {
        if self.task_broker_url.is_none() {
            self.task_broker_url = Some(self.redis_url.clone());
        }
        if self.task_result_backend_url.is_none() {
            self.task_result_backend_url = Some(self.redis_url.clone());
        }
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::MissingVariable { name })
}

/// Variable names match case-insensitively: `DATABASE_URL` and
/// `database_url` both satisfy the same field.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .or_else(|| lookup(&name.to_lowercase()))
        .filter(|v| !v.is_empty())
}

fn string_or<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).unwrap_or_else(|| default.to_string())
}

fn parsed_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgresql://localhost/biznesplan"),
            ("CEIDG_API_KEY", "ceidg-key"),
            ("PODIO_APP_ID", "app-1"),
            ("PODIO_APP_TOKEN", "token-1"),
            ("PODIO_WORKSPACE_ID", "ws-1"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Settings, ConfigError> {
        Settings::from_lookup(|name| env.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn missing_required_variable_names_it() {
        let mut env = base_env();
        env.remove("ANTHROPIC_API_KEY");
        match load(&env) {
            Err(ConfigError::MissingVariable { name }) => assert_eq!(name, "ANTHROPIC_API_KEY"),
            other => panic!("expected MissingVariable, got {other:?}"),
        }
    }

    #[test]
    fn queue_urls_derive_from_redis_url() {
        let mut env = base_env();
        env.insert("REDIS_URL", "redis://x:6379/0");
        let settings = load(&env).unwrap();
        assert_eq!(settings.task_broker_url.as_deref(), Some("redis://x:6379/0"));
        assert_eq!(
            settings.task_result_backend_url.as_deref(),
            Some("redis://x:6379/0")
        );
    }

    #[test]
    fn explicit_queue_urls_are_left_untouched() {
        let mut env = base_env();
        env.insert("REDIS_URL", "redis://x:6379/0");
        env.insert("TASK_BROKER_URL", "amqp://rabbit:5672");
        let settings = load(&env).unwrap();
        assert_eq!(
            settings.task_broker_url.as_deref(),
            Some("amqp://rabbit:5672")
        );
        // The backend URL was unset and still derives.
        assert_eq!(
            settings.task_result_backend_url.as_deref(),
            Some("redis://x:6379/0")
        );
    }

    #[test]
    fn derivation_is_idempotent() {
        let mut env = base_env();
        env.insert("REDIS_URL", "redis://x:6379/0");
        let mut settings = load(&env).unwrap();
        let before = settings.task_broker_url.clone();
        settings.derive_queue_urls();
        assert_eq!(settings.task_broker_url, before);
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = load(&base_env()).unwrap();
        assert_eq!(settings.redis_url, "redis://localhost:6379/0");
        assert_eq!(settings.llm_max_retries, 3);
        assert_eq!(settings.biznesplan_max_iterations, 3);
        assert_eq!(settings.db_pool_size, 10);
        assert!(!settings.debug);
    }

    #[test]
    fn lowercase_variable_names_are_accepted() {
        let mut env = base_env();
        env.remove("DATABASE_URL");
        env.insert("database_url", "postgresql://lower/case");
        let settings = load(&env).unwrap();
        assert_eq!(settings.database_url, "postgresql://lower/case");
    }

    #[test]
    fn invalid_numeric_value_is_an_error() {
        let mut env = base_env();
        env.insert("LLM_MAX_RETRIES", "many");
        match load(&env) {
            Err(ConfigError::InvalidValue { name, value }) => {
                assert_eq!(name, "LLM_MAX_RETRIES");
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}
