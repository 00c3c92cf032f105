use std::env;
use std::fs;
use std::path::Path;

use serde::Serialize;
use souk_core::config::{resolve_config_path, AppConfig};
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key: &'static str, env_key: &'static str| {
        field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries = rendered_values(&config)
        .into_iter()
        .map(|(key, env_key, value)| ConfigEntry { key, value, source: source(key, env_key) })
        .collect::<Vec<_>>();

    let message = match config_file_path.as_deref() {
        Some(path) => format!(
            "effective config (precedence: env > file > default), file: {}",
            path.display()
        ),
        None => "effective config (precedence: env > file > default), no config file".to_string(),
    };
    CommandResult::success_with_details("config", message, &entries)
}

fn rendered_values(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    vec![
        ("database.url", "SOUK_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "SOUK_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "SOUK_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("server.bind_address", "SOUK_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        (
            "server.health_check_port",
            "SOUK_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        (
            "server.graceful_shutdown_secs",
            "SOUK_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "negotiation.max_rounds",
            "SOUK_NEGOTIATION_MAX_ROUNDS",
            config.negotiation.max_rounds.to_string(),
        ),
        (
            "negotiation.counter_offer_validity_hours",
            "SOUK_NEGOTIATION_COUNTER_OFFER_VALIDITY_HOURS",
            config.negotiation.counter_offer_validity_hours.to_string(),
        ),
        (
            "negotiation.quote_validity_days",
            "SOUK_NEGOTIATION_QUOTE_VALIDITY_DAYS",
            config.negotiation.quote_validity_days.to_string(),
        ),
        (
            "auto_conversion.enabled",
            "SOUK_AUTO_CONVERSION_ENABLED",
            config.auto_conversion.enabled.to_string(),
        ),
        (
            "auto_conversion.negotiation_timeout_hours",
            "SOUK_AUTO_CONVERSION_NEGOTIATION_TIMEOUT_HOURS",
            config.auto_conversion.negotiation_timeout_hours.to_string(),
        ),
        (
            "auto_conversion.auto_accept_threshold_pct",
            "SOUK_AUTO_CONVERSION_AUTO_ACCEPT_THRESHOLD_PCT",
            config.auto_conversion.auto_accept_threshold_pct.to_string(),
        ),
        ("sweeper.enabled", "SOUK_SWEEPER_ENABLED", config.sweeper.enabled.to_string()),
        (
            "sweeper.interval_secs",
            "SOUK_SWEEPER_INTERVAL_SECS",
            config.sweeper.interval_secs.to_string(),
        ),
        ("logging.level", "SOUK_LOGGING_LEVEL", config.logging.level.clone()),
        (
            "logging.format",
            "SOUK_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source};

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = "[negotiation]\nmax_rounds = 7\n".parse().expect("toml");

        assert!(contains_path(&doc, "negotiation.max_rounds"));
        assert!(!contains_path(&doc, "negotiation.quote_validity_days"));
        assert!(!contains_path(&doc, "sweeper.enabled"));
    }

    #[test]
    fn field_source_falls_back_to_file_then_default() {
        let doc: toml::Value = "[sweeper]\ninterval_secs = 30\n".parse().expect("toml");
        let path = std::path::Path::new("souk.toml");

        assert_eq!(
            field_source(
                "sweeper.interval_secs",
                "SOUK_TEST_UNSET_SWEEPER_INTERVAL",
                Some(&doc),
                Some(path)
            ),
            "file (souk.toml)"
        );
        assert_eq!(
            field_source(
                "sweeper.enabled",
                "SOUK_TEST_UNSET_SWEEPER_ENABLED",
                Some(&doc),
                Some(path),
            ),
            "default"
        );
    }
}
