use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chainpolicy_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::{to_data, CommandResult};

const COMMAND: &str = "config";

/// One effective setting and where its value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: Vec<ConfigEntry> = config
        .describe()
        .into_iter()
        .map(|(key, value)| ConfigEntry {
            key: key.to_string(),
            value,
            source: field_source(
                key,
                options,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        })
        .collect();

    CommandResult::success_with_data(
        COMMAND,
        "effective config (source precedence: override > env > file > default)",
        to_data(&entries),
    )
}

/// `database.url` is read from `CHAINPOLICY_DATABASE_URL`.
pub fn env_key(key_path: &str) -> String {
    format!("CHAINPOLICY_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn overridden(key_path: &str, options: &LoadOptions) -> bool {
    let overrides = &options.overrides;
    match key_path {
        "database.url" => overrides.database_url.is_some(),
        "logging.level" => overrides.log_level.is_some(),
        "pdp.enabled" => overrides.pdp_enabled.is_some(),
        "pdp.base_url" => overrides.pdp_base_url.is_some(),
        _ => false,
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    ["chainpolicy.toml", "config/chainpolicy.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    options: &LoadOptions,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if overridden(key_path, options) {
        return "override".to_string();
    }

    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
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
