use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use copurchase_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    CommandResult::success("config", render(&config))
}

fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, doc.as_ref(), config_file_path.as_deref())
    };

    let calculation = &config.calculation;
    let fields: [(&str, String, &[&str]); 13] = [
        ("database.url", redact_url(&config.database.url), &["COPURCHASE_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["COPURCHASE_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["COPURCHASE_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["COPURCHASE_LOGGING_LEVEL", "COPURCHASE_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["COPURCHASE_LOGGING_FORMAT", "COPURCHASE_LOG_FORMAT"],
        ),
        (
            "calculation.time_window_days",
            calculation.time_window_days.to_string(),
            &["COPURCHASE_CALCULATION_TIME_WINDOW_DAYS"],
        ),
        (
            "calculation.min_cooccurrence",
            calculation.min_cooccurrence.to_string(),
            &["COPURCHASE_CALCULATION_MIN_COOCCURRENCE"],
        ),
        (
            "calculation.min_score",
            calculation.min_score.to_string(),
            &["COPURCHASE_CALCULATION_MIN_SCORE"],
        ),
        (
            "calculation.max_recommendations",
            calculation.max_recommendations.to_string(),
            &["COPURCHASE_CALCULATION_MAX_RECOMMENDATIONS"],
        ),
        (
            "calculation.fallback_to_related_products",
            calculation.fallback_to_related_products.to_string(),
            &["COPURCHASE_CALCULATION_FALLBACK_TO_RELATED_PRODUCTS"],
        ),
        (
            "calculation.frequency_weight",
            calculation.weights.frequency.to_string(),
            &["COPURCHASE_CALCULATION_FREQUENCY_WEIGHT"],
        ),
        (
            "calculation.recency_weight",
            calculation.weights.recency.to_string(),
            &["COPURCHASE_CALCULATION_RECENCY_WEIGHT"],
        ),
        (
            "calculation.value_weight",
            calculation.weights.value.to_string(),
            &["COPURCHASE_CALCULATION_VALUE_WEIGHT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .iter()
            .map(|(key, value, env_keys)| render_line(key, value, source(*key, *env_keys))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("copurchase.toml"), PathBuf::from("config/copurchase.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// SQLite URLs may carry query parameters such as keys; only the path is shown.
fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((path, _)) => format!("{path}?<redacted>"),
        None => url.to_string(),
    }
}
