use std::env;
use std::time::Duration;

/// Default Binance ticker endpoint for the tracked asset
pub const DEFAULT_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT";

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Price ticker configuration
#[derive(Debug, Clone)]
pub struct TickerConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the service against the in-memory player store
    pub database: Option<DatabaseConfig>,
    pub ticker: TickerConfig,
    pub log_level: String,
    pub log_json: bool,
    pub ws_port: u16,
    pub environment: String,
    pub auto_resolve: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables.
    ///
    /// Returns `Ok(None)` when `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Option<Self>, String> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Ok(None),
        };

        let config = Self {
            url,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            acquire_timeout_secs: env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30),
            idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600), // 10 minutes
            max_lifetime_secs: env_parse("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800), // 30 minutes
            test_before_acquire: env_parse("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true),
        };

        config.validate()?;
        Ok(Some(config))
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if self.acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/guessr".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl TickerConfig {
    pub fn from_env() -> Result<Self, String> {
        let config = Self {
            url: env::var("TICKER_URL").unwrap_or_else(|_| DEFAULT_TICKER_URL.to_string()),
            timeout_secs: env_parse("TICKER_TIMEOUT_SECS").unwrap_or(10),
            poll_interval_secs: env_parse("TICKER_POLL_SECS").unwrap_or(5),
        };

        if config.timeout_secs == 0 {
            return Err("TICKER_TIMEOUT_SECS must be greater than 0".to_string());
        }
        if config.poll_interval_secs == 0 {
            return Err("TICKER_POLL_SECS must be greater than 0".to_string());
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TICKER_URL.to_string(),
            timeout_secs: 10,
            poll_interval_secs: 5,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let ticker = TickerConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let ws_port = env_parse("WS_PORT").unwrap_or(8080);

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let auto_resolve = env_parse("AUTO_RESOLVE").unwrap_or(true);

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let environment = environment.to_lowercase();
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        let log_json = parse_log_format(env::var("LOG_FORMAT").ok().as_deref(), &environment)?;

        let config = Self {
            database,
            ticker,
            log_level: log_level.to_lowercase(),
            log_json,
            ws_port,
            environment,
            auto_resolve,
        };
        config.validate()?;

        Ok(config)
    }

    /// Production must not silently fall back to the in-memory store
    fn validate(&self) -> Result<(), String> {
        if self.is_production() && self.database.is_none() {
            return Err("DATABASE_URL is required when ENVIRONMENT=production".to_string());
        }
        Ok(())
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// `LOG_FORMAT` wins when set; otherwise production logs JSON and every
/// other environment logs text.
fn parse_log_format(format: Option<&str>, environment: &str) -> Result<bool, String> {
    match format.map(str::to_lowercase).as_deref() {
        Some("json") => Ok(true),
        Some("text") => Ok(false),
        Some(other) => Err(format!("Invalid LOG_FORMAT: {}. Must be text or json", other)),
        None => Ok(environment == "production"),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            ticker: TickerConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
            ws_port: 8080,
            environment: "development".to_string(),
            auto_resolve: true,
        }
    }
}
