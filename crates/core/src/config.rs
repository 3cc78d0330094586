use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::settings::CalculationSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Defaults written by the settings store's bootstrap when no settings exist yet.
    pub calculation: CalculationSettings,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
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
    pub time_window_days: Option<u32>,
    pub min_cooccurrence: Option<u32>,
    pub min_score: Option<f64>,
    pub max_recommendations: Option<usize>,
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
                url: "sqlite://copurchase.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            calculation: CalculationSettings::default(),
        }
    }
}

impl std::str::FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("copurchase.toml"));
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(calculation) = patch.calculation {
            let settings = &mut self.calculation;
            if let Some(time_window_days) = calculation.time_window_days {
                settings.time_window_days = time_window_days;
            }
            if let Some(min_cooccurrence) = calculation.min_cooccurrence {
                settings.min_cooccurrence = min_cooccurrence;
            }
            if let Some(min_score) = calculation.min_score {
                settings.min_score = min_score;
            }
            if let Some(max_recommendations) = calculation.max_recommendations {
                settings.max_recommendations = max_recommendations;
            }
            if let Some(fallback) = calculation.fallback_to_related_products {
                settings.fallback_to_related_products = fallback;
            }
            if let Some(weight) = calculation.frequency_weight {
                settings.weights.frequency = weight;
            }
            if let Some(weight) = calculation.recency_weight {
                settings.weights.recency = weight;
            }
            if let Some(weight) = calculation.value_weight {
                settings.weights.value = weight;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COPURCHASE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COPURCHASE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("COPURCHASE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("COPURCHASE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("COPURCHASE_LOGGING_LEVEL").or_else(|| read_env("COPURCHASE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COPURCHASE_LOGGING_FORMAT").or_else(|| read_env("COPURCHASE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        let settings = &mut self.calculation;
        if let Some(value) = read_env("COPURCHASE_CALCULATION_TIME_WINDOW_DAYS") {
            settings.time_window_days =
                parse_env("COPURCHASE_CALCULATION_TIME_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_MIN_COOCCURRENCE") {
            settings.min_cooccurrence =
                parse_env("COPURCHASE_CALCULATION_MIN_COOCCURRENCE", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_MIN_SCORE") {
            settings.min_score = parse_env("COPURCHASE_CALCULATION_MIN_SCORE", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_MAX_RECOMMENDATIONS") {
            settings.max_recommendations =
                parse_env("COPURCHASE_CALCULATION_MAX_RECOMMENDATIONS", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_FALLBACK_TO_RELATED_PRODUCTS") {
            settings.fallback_to_related_products =
                parse_env("COPURCHASE_CALCULATION_FALLBACK_TO_RELATED_PRODUCTS", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_FREQUENCY_WEIGHT") {
            settings.weights.frequency =
                parse_env("COPURCHASE_CALCULATION_FREQUENCY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_RECENCY_WEIGHT") {
            settings.weights.recency = parse_env("COPURCHASE_CALCULATION_RECENCY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("COPURCHASE_CALCULATION_VALUE_WEIGHT") {
            settings.weights.value = parse_env("COPURCHASE_CALCULATION_VALUE_WEIGHT", &value)?;
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
        if let Some(time_window_days) = overrides.time_window_days {
            self.calculation.time_window_days = time_window_days;
        }
        if let Some(min_cooccurrence) = overrides.min_cooccurrence {
            self.calculation.min_cooccurrence = min_cooccurrence;
        }
        if let Some(min_score) = overrides.min_score {
            self.calculation.min_score = min_score;
        }
        if let Some(max_recommendations) = overrides.max_recommendations {
            self.calculation.max_recommendations = max_recommendations;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        self.calculation
            .validate()
            .map_err(|error| ConfigError::Validation(format!("calculation: {error}")))?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("copurchase.toml"), PathBuf::from("config/copurchase.toml")]
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

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    calculation: Option<CalculationPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct CalculationPatch {
    time_window_days: Option<u32>,
    min_cooccurrence: Option<u32>,
    min_score: Option<f64>,
    max_recommendations: Option<usize>,
    fallback_to_related_products: Option<bool>,
    frequency_weight: Option<f64>,
    recency_weight: Option<f64>,
    value_weight: Option<f64>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://copurchase.db", "default database url")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "default format is compact")?;
        ensure(config.calculation.time_window_days == 90, "default window is 90 days")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_COPURCHASE_DB", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("copurchase.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_COPURCHASE_DB}"

[calculation]
time_window_days = 30
min_cooccurrence = 5
frequency_weight = 0.6
recency_weight = 0.2
value_weight = 0.2
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.calculation.time_window_days == 30, "window should come from file")?;
            ensure(config.calculation.min_cooccurrence == 5, "threshold should come from file")?;
            ensure(
                (config.calculation.weights.frequency - 0.6).abs() < f64::EPSILON,
                "frequency weight should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_COPURCHASE_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COPURCHASE_LOG_LEVEL", "warn");
        env::set_var("COPURCHASE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["COPURCHASE_LOG_LEVEL", "COPURCHASE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COPURCHASE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("COPURCHASE_CALCULATION_MIN_COOCCURRENCE", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("copurchase.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"

[calculation]
min_cooccurrence = 4
max_recommendations = 8
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.calculation.min_cooccurrence == 7,
                "env threshold should win over file and defaults",
            )?;
            ensure(
                config.calculation.max_recommendations == 8,
                "file value should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["COPURCHASE_DATABASE_URL", "COPURCHASE_CALCULATION_MIN_COOCCURRENCE"]);
        result
    }

    #[test]
    fn invalid_weights_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COPURCHASE_CALCULATION_VALUE_WEIGHT", "0.9");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("weights must sum")
            );
            ensure(has_message, "validation failure should mention the weight sum")
        })();

        clear_vars(&["COPURCHASE_CALCULATION_VALUE_WEIGHT"]);
        result
    }

    #[test]
    fn malformed_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COPURCHASE_CALCULATION_TIME_WINDOW_DAYS", "ninety");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "COPURCHASE_CALCULATION_TIME_WINDOW_DAYS",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected malformed override to fail".to_string()),
        };

        clear_vars(&["COPURCHASE_CALCULATION_TIME_WINDOW_DAYS"]);
        result
    }

    #[test]
    fn non_sqlite_database_url_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/shop".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        match result {
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("database.url"), "message should name database.url")
            }
            _ => Err("expected database url validation failure".to_string()),
        }
    }
}
