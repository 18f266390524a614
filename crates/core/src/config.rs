use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::policy::TimeWindows;
use crate::translator::SelectionBaselines;

const CLOCK_FORMAT: &str = "%H:%M";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pdp: PdpConfig,
    pub selection: SelectionBaselines,
    pub timeframes: TimeWindows,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Policy decision point that enforces translated policies.
#[derive(Clone, Debug)]
pub struct PdpConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub api_token: Option<SecretString>,
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
    pub pdp_enabled: Option<bool>,
    pub pdp_base_url: Option<String>,
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
                url: "sqlite://chainpolicy.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            pdp: PdpConfig {
                enabled: false,
                base_url: "http://localhost:3000".to_string(),
                timeout_secs: 10,
                api_token: None,
            },
            selection: SelectionBaselines::default(),
            timeframes: TimeWindows::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("chainpolicy.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Key/value view with secrets redacted, for operator inspection.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("database.url", self.database.url.clone()),
            ("database.max_connections", self.database.max_connections.to_string()),
            ("database.timeout_secs", self.database.timeout_secs.to_string()),
            ("pdp.enabled", self.pdp.enabled.to_string()),
            ("pdp.base_url", self.pdp.base_url.clone()),
            ("pdp.timeout_secs", self.pdp.timeout_secs.to_string()),
            (
                "pdp.api_token",
                if self.pdp.api_token.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            ),
            ("selection.min_tx_rate", self.selection.min_tx_rate.to_string()),
            ("selection.max_tx_cost", self.selection.max_tx_cost.to_string()),
            ("selection.min_popularity", self.selection.min_popularity.to_string()),
            ("selection.min_stability", self.selection.min_stability.to_string()),
            ("timeframes.day_start", self.timeframes.day_start.format(CLOCK_FORMAT).to_string()),
            (
                "timeframes.afternoon_start",
                self.timeframes.afternoon_start.format(CLOCK_FORMAT).to_string(),
            ),
            (
                "timeframes.night_start",
                self.timeframes.night_start.format(CLOCK_FORMAT).to_string(),
            ),
            ("logging.level", self.logging.level.clone()),
            ("logging.format", self.logging.format.as_str().to_string()),
        ]
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
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

        if let Some(pdp) = patch.pdp {
            if let Some(enabled) = pdp.enabled {
                self.pdp.enabled = enabled;
            }
            if let Some(base_url) = pdp.base_url {
                self.pdp.base_url = base_url;
            }
            if let Some(timeout_secs) = pdp.timeout_secs {
                self.pdp.timeout_secs = timeout_secs;
            }
            if let Some(pdp_api_token_value) = pdp.api_token {
                self.pdp.api_token = Some(secret_value(pdp_api_token_value));
            }
        }

        if let Some(selection) = patch.selection {
            if let Some(min_tx_rate) = selection.min_tx_rate {
                self.selection.min_tx_rate = min_tx_rate;
            }
            if let Some(max_tx_cost) = selection.max_tx_cost {
                self.selection.max_tx_cost = max_tx_cost;
            }
            if let Some(min_popularity) = selection.min_popularity {
                self.selection.min_popularity = min_popularity;
            }
            if let Some(min_stability) = selection.min_stability {
                self.selection.min_stability = min_stability;
            }
        }

        if let Some(timeframes) = patch.timeframes {
            if let Some(day_start) = timeframes.day_start {
                self.timeframes.day_start = parse_clock("timeframes.day_start", &day_start)?;
            }
            if let Some(afternoon_start) = timeframes.afternoon_start {
                self.timeframes.afternoon_start =
                    parse_clock("timeframes.afternoon_start", &afternoon_start)?;
            }
            if let Some(night_start) = timeframes.night_start {
                self.timeframes.night_start = parse_clock("timeframes.night_start", &night_start)?;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CHAINPOLICY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CHAINPOLICY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CHAINPOLICY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CHAINPOLICY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHAINPOLICY_PDP_ENABLED") {
            self.pdp.enabled = parse_bool("CHAINPOLICY_PDP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_PDP_BASE_URL") {
            self.pdp.base_url = value;
        }
        if let Some(value) = read_env("CHAINPOLICY_PDP_TIMEOUT_SECS") {
            self.pdp.timeout_secs = parse_u64("CHAINPOLICY_PDP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_PDP_API_TOKEN") {
            self.pdp.api_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("CHAINPOLICY_SELECTION_MIN_TX_RATE") {
            self.selection.min_tx_rate = parse_u32("CHAINPOLICY_SELECTION_MIN_TX_RATE", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_SELECTION_MAX_TX_COST") {
            self.selection.max_tx_cost =
                parse_decimal("CHAINPOLICY_SELECTION_MAX_TX_COST", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_SELECTION_MIN_POPULARITY") {
            self.selection.min_popularity =
                parse_f64("CHAINPOLICY_SELECTION_MIN_POPULARITY", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_SELECTION_MIN_STABILITY") {
            self.selection.min_stability =
                parse_f64("CHAINPOLICY_SELECTION_MIN_STABILITY", &value)?;
        }

        if let Some(value) = read_env("CHAINPOLICY_TIMEFRAMES_DAY_START") {
            self.timeframes.day_start = parse_clock_env("CHAINPOLICY_TIMEFRAMES_DAY_START", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_TIMEFRAMES_AFTERNOON_START") {
            self.timeframes.afternoon_start =
                parse_clock_env("CHAINPOLICY_TIMEFRAMES_AFTERNOON_START", &value)?;
        }
        if let Some(value) = read_env("CHAINPOLICY_TIMEFRAMES_NIGHT_START") {
            self.timeframes.night_start =
                parse_clock_env("CHAINPOLICY_TIMEFRAMES_NIGHT_START", &value)?;
        }

        let log_level = read_env("CHAINPOLICY_LOGGING_LEVEL")
            .or_else(|| read_env("CHAINPOLICY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("CHAINPOLICY_LOGGING_FORMAT")
            .or_else(|| read_env("CHAINPOLICY_LOG_FORMAT"));
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
        if let Some(enabled) = overrides.pdp_enabled {
            self.pdp.enabled = enabled;
        }
        if let Some(base_url) = overrides.pdp_base_url {
            self.pdp.base_url = base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_pdp(&self.pdp)?;
        validate_selection(&self.selection)?;
        validate_timeframes(&self.timeframes)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("chainpolicy.toml"), PathBuf::from("config/chainpolicy.toml")]
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

fn validate_pdp(pdp: &PdpConfig) -> Result<(), ConfigError> {
    if pdp.timeout_secs == 0 || pdp.timeout_secs > 300 {
        return Err(ConfigError::Validation("pdp.timeout_secs must be in range 1..=300".to_string()));
    }

    if !pdp.enabled {
        return Ok(());
    }

    let base_url = pdp.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "pdp.base_url must start with http:// or https:// when pdp.enabled is true"
                .to_string(),
        ));
    }

    let blank_token =
        pdp.api_token.as_ref().map(|token| token.expose_secret().trim().is_empty()).unwrap_or(false);
    if blank_token {
        return Err(ConfigError::Validation(
            "pdp.api_token must not be blank; omit it to send unauthenticated requests".to_string(),
        ));
    }

    Ok(())
}

fn validate_selection(selection: &SelectionBaselines) -> Result<(), ConfigError> {
    if selection.max_tx_cost.is_sign_negative() {
        return Err(ConfigError::Validation(
            "selection.max_tx_cost must not be negative".to_string(),
        ));
    }

    for (key, value) in [
        ("selection.min_popularity", selection.min_popularity),
        ("selection.min_stability", selection.min_stability),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range 0.0..=1.0")));
        }
    }

    Ok(())
}

fn validate_timeframes(timeframes: &TimeWindows) -> Result<(), ConfigError> {
    let ordered = timeframes.day_start < timeframes.afternoon_start
        && timeframes.afternoon_start < timeframes.night_start;
    if !ordered {
        return Err(ConfigError::Validation(
            "timeframes must satisfy day_start < afternoon_start < night_start".to_string(),
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

fn parse_clock(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), CLOCK_FORMAT)
        .map_err(|_| ConfigError::Validation(format!("{key} must be a HH:MM clock time, got `{value}`")))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_clock_env(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), CLOCK_FORMAT).map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    pdp: Option<PdpPatch>,
    selection: Option<SelectionPatch>,
    timeframes: Option<TimeframesPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PdpPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SelectionPatch {
    min_tx_rate: Option<u32>,
    max_tx_cost: Option<Decimal>,
    min_popularity: Option<f64>,
    min_stability: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TimeframesPatch {
    day_start: Option<String>,
    afternoon_start: Option<String>,
    night_start: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
