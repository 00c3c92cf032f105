use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "souk.toml";
pub const NESTED_CONFIG_FILE: &str = "config/souk.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub negotiation: NegotiationConfig,
    pub auto_conversion: AutoConversionConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Limits applied by the quote and negotiation managers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationConfig {
    pub max_rounds: u32,
    pub counter_offer_validity_hours: u32,
    pub quote_validity_days: u32,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self { max_rounds: 5, counter_offer_validity_hours: 24, quote_validity_days: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoConversionConfig {
    pub enabled: bool,
    pub negotiation_timeout_hours: u32,
    /// Maximum distance between a stale counter and the quote's original price, in percent.
    pub auto_accept_threshold_pct: Decimal,
}

impl Default for AutoConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            negotiation_timeout_hours: 48,
            auto_accept_threshold_pct: Decimal::new(5, 0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub auto_conversion_enabled: Option<bool>,
    pub sweeper_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://souk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            negotiation: NegotiationConfig::default(),
            auto_conversion: AutoConversionConfig::default(),
            sweeper: SweeperConfig { enabled: true, interval_secs: 60 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(negotiation) = patch.negotiation {
            if let Some(max_rounds) = negotiation.max_rounds {
                self.negotiation.max_rounds = max_rounds;
            }
            if let Some(hours) = negotiation.counter_offer_validity_hours {
                self.negotiation.counter_offer_validity_hours = hours;
            }
            if let Some(days) = negotiation.quote_validity_days {
                self.negotiation.quote_validity_days = days;
            }
        }

        if let Some(auto_conversion) = patch.auto_conversion {
            if let Some(enabled) = auto_conversion.enabled {
                self.auto_conversion.enabled = enabled;
            }
            if let Some(hours) = auto_conversion.negotiation_timeout_hours {
                self.auto_conversion.negotiation_timeout_hours = hours;
            }
            if let Some(threshold) = auto_conversion.auto_accept_threshold_pct {
                self.auto_conversion.auto_accept_threshold_pct = threshold;
            }
        }

        if let Some(sweeper) = patch.sweeper {
            if let Some(enabled) = sweeper.enabled {
                self.sweeper.enabled = enabled;
            }
            if let Some(interval_secs) = sweeper.interval_secs {
                self.sweeper.interval_secs = interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SOUK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SOUK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SOUK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SOUK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SOUK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SOUK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("SOUK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SOUK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SOUK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUK_NEGOTIATION_MAX_ROUNDS") {
            self.negotiation.max_rounds = parse_u32("SOUK_NEGOTIATION_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("SOUK_NEGOTIATION_COUNTER_OFFER_VALIDITY_HOURS") {
            self.negotiation.counter_offer_validity_hours =
                parse_u32("SOUK_NEGOTIATION_COUNTER_OFFER_VALIDITY_HOURS", &value)?;
        }
        if let Some(value) = read_env("SOUK_NEGOTIATION_QUOTE_VALIDITY_DAYS") {
            self.negotiation.quote_validity_days =
                parse_u32("SOUK_NEGOTIATION_QUOTE_VALIDITY_DAYS", &value)?;
        }

        if let Some(value) = read_env("SOUK_AUTO_CONVERSION_ENABLED") {
            self.auto_conversion.enabled = parse_bool("SOUK_AUTO_CONVERSION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SOUK_AUTO_CONVERSION_NEGOTIATION_TIMEOUT_HOURS") {
            self.auto_conversion.negotiation_timeout_hours =
                parse_u32("SOUK_AUTO_CONVERSION_NEGOTIATION_TIMEOUT_HOURS", &value)?;
        }
        if let Some(value) = read_env("SOUK_AUTO_CONVERSION_AUTO_ACCEPT_THRESHOLD_PCT") {
            self.auto_conversion.auto_accept_threshold_pct =
                parse_decimal("SOUK_AUTO_CONVERSION_AUTO_ACCEPT_THRESHOLD_PCT", &value)?;
        }

        if let Some(value) = read_env("SOUK_SWEEPER_ENABLED") {
            self.sweeper.enabled = parse_bool("SOUK_SWEEPER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SOUK_SWEEPER_INTERVAL_SECS") {
            self.sweeper.interval_secs = parse_u64("SOUK_SWEEPER_INTERVAL_SECS", &value)?;
        }

        let log_level = read_env("SOUK_LOGGING_LEVEL").or_else(|| read_env("SOUK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SOUK_LOGGING_FORMAT").or_else(|| read_env("SOUK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(enabled) = overrides.auto_conversion_enabled {
            self.auto_conversion.enabled = enabled;
        }
        if let Some(enabled) = overrides.sweeper_enabled {
            self.sweeper.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_negotiation(&self.negotiation)?;
        validate_auto_conversion(&self.auto_conversion)?;
        validate_sweeper(&self.sweeper)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would pick up, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_negotiation(negotiation: &NegotiationConfig) -> Result<(), ConfigError> {
    if negotiation.max_rounds == 0 || negotiation.max_rounds > 50 {
        return Err(ConfigError::Validation(
            "negotiation.max_rounds must be in range 1..=50".to_string(),
        ));
    }

    if negotiation.counter_offer_validity_hours == 0 {
        return Err(ConfigError::Validation(
            "negotiation.counter_offer_validity_hours must be greater than zero".to_string(),
        ));
    }

    if negotiation.quote_validity_days == 0 {
        return Err(ConfigError::Validation(
            "negotiation.quote_validity_days must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auto_conversion(auto_conversion: &AutoConversionConfig) -> Result<(), ConfigError> {
    let threshold = auto_conversion.auto_accept_threshold_pct;
    if threshold < Decimal::ZERO || threshold > Decimal::ONE_HUNDRED {
        return Err(ConfigError::Validation(
            "auto_conversion.auto_accept_threshold_pct must be in range 0..=100".to_string(),
        ));
    }

    if auto_conversion.negotiation_timeout_hours == 0 {
        return Err(ConfigError::Validation(
            "auto_conversion.negotiation_timeout_hours must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_sweeper(sweeper: &SweeperConfig) -> Result<(), ConfigError> {
    if sweeper.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweeper.interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    negotiation: Option<NegotiationPatch>,
    auto_conversion: Option<AutoConversionPatch>,
    sweeper: Option<SweeperPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NegotiationPatch {
    max_rounds: Option<u32>,
    counter_offer_validity_hours: Option<u32>,
    quote_validity_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AutoConversionPatch {
    enabled: Option<bool>,
    negotiation_timeout_hours: Option<u32>,
    auto_accept_threshold_pct: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct SweeperPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
