use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
/// Database and Tor credentials plus the log destination are required;
/// everything else has a default tuned for the public GMGN endpoints.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub db_user: String,
    pub db_password: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,

    // Tor
    pub tor_control_host: String,
    pub tor_control_port: u16,
    pub tor_password: String,
    pub tor_socks_url: String,
    pub tor_settle: Duration,

    // Upstream
    pub gmgn_base_url: String,

    // Logging
    pub log_file: PathBuf,

    // Dedup
    pub seen_tokens_file: PathBuf,
    pub max_tracked_tokens: usize,

    // Extraction / updates
    pub fetch_width: usize,
    pub update_batch_size: usize,
    pub update_width: usize,
    pub update_max_retries: u32,
    pub update_retry_delay: Duration,

    // Pipeline pacing
    pub cycle_sleep_min: Duration,
    pub cycle_sleep_max: Duration,
    pub error_cooldown: Duration,

    // Load
    pub load_batch_size: usize,
}

const REQUIRED: &[&str] = &[
    "DB_USER",
    "DB_PASSWORD",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "TOR_PASSWORD",
    "LOG_FILE",
];

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. All missing required
    /// keys are reported together; blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|key| value(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &str| value(key).unwrap_or_default();
        let optional = |key: &str, default: &str| value(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            db_user: required("DB_USER"),
            db_password: required("DB_PASSWORD"),
            db_host: required("DB_HOST"),
            db_port: parse("DB_PORT", &required("DB_PORT"))?,
            db_name: required("DB_NAME"),
            tor_control_host: optional("TOR_CONTROL_HOST", "127.0.0.1"),
            tor_control_port: parse("TOR_CONTROL_PORT", &optional("TOR_CONTROL_PORT", "9051"))?,
            tor_password: required("TOR_PASSWORD"),
            tor_socks_url: optional("TOR_SOCKS_URL", "socks5h://127.0.0.1:9050"),
            tor_settle: secs("TOR_SETTLE_SECS", &optional("TOR_SETTLE_SECS", "5"))?,
            gmgn_base_url: optional("GMGN_BASE_URL", "https://gmgn.ai"),
            log_file: PathBuf::from(required("LOG_FILE")),
            seen_tokens_file: PathBuf::from(optional(
                "SEEN_TOKENS_FILE",
                "seen_base_addresses.json",
            )),
            max_tracked_tokens: positive(
                "MAX_TRACKED_TOKENS",
                &optional("MAX_TRACKED_TOKENS", "2000"),
            )?,
            fetch_width: positive("FETCH_WIDTH", &optional("FETCH_WIDTH", "5"))?,
            update_batch_size: positive("UPDATE_BATCH_SIZE", &optional("UPDATE_BATCH_SIZE", "10"))?,
            update_width: positive("UPDATE_WIDTH", &optional("UPDATE_WIDTH", "5"))?,
            update_max_retries: positive(
                "UPDATE_MAX_RETRIES",
                &optional("UPDATE_MAX_RETRIES", "3"),
            )?,
            update_retry_delay: secs(
                "UPDATE_RETRY_DELAY_SECS",
                &optional("UPDATE_RETRY_DELAY_SECS", "10"),
            )?,
            cycle_sleep_min: secs("CYCLE_SLEEP_MIN_SECS", &optional("CYCLE_SLEEP_MIN_SECS", "5"))?,
            cycle_sleep_max: secs(
                "CYCLE_SLEEP_MAX_SECS",
                &optional("CYCLE_SLEEP_MAX_SECS", "15"),
            )?,
            error_cooldown: secs("ERROR_COOLDOWN_SECS", &optional("ERROR_COOLDOWN_SECS", "10"))?,
            load_batch_size: positive("LOAD_BATCH_SIZE", &optional("LOAD_BATCH_SIZE", "50"))?,
        };

        if config.cycle_sleep_min > config.cycle_sleep_max {
            return Err(ConfigError::Invalid {
                key: "CYCLE_SLEEP_MIN_SECS".to_string(),
                value: format!(
                    "{} exceeds CYCLE_SLEEP_MAX_SECS {}",
                    config.cycle_sleep_min.as_secs(),
                    config.cycle_sleep_max.as_secs()
                ),
            });
        }

        Ok(config)
    }

    /// Log the loaded values with secrets cut down to a short preview.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(2).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!(
            "  DB: {}@{}:{}/{}",
            self.db_user,
            self.db_host,
            self.db_port,
            self.db_name
        );
        tracing::info!("  DB_PASSWORD: {}", preview(&self.db_password));
        tracing::info!(
            "  TOR_CONTROL: {}:{}",
            self.tor_control_host,
            self.tor_control_port
        );
        tracing::info!("  TOR_PASSWORD: {}", preview(&self.tor_password));
        tracing::info!("  TOR_SOCKS_URL: {}", self.tor_socks_url);
        tracing::info!("  GMGN_BASE_URL: {}", self.gmgn_base_url);
        tracing::info!("  SEEN_TOKENS_FILE: {}", self.seen_tokens_file.display());
        tracing::info!("  LOG_FILE: {}", self.log_file.display());
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(key, raw).map(Duration::from_secs)
}

fn positive<T: FromStr + PartialOrd + Default>(key: &str, raw: &str) -> Result<T, ConfigError> {
    let value: T = parse(key, raw)?;
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }
}
