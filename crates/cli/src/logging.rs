use chainpolicy_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// command payloads. `RUST_LOG` wins over the configured level.
pub fn init(options: &LoadOptions) {
    let (level, format) = match AppConfig::load(options.clone()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_owned(), LogFormat::Compact),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "system.logging.already_installed", "subscriber already set");
    }
}
