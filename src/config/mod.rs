mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, OverflowPolicy, ServerSettings, Settings};

/// Prefix for environment overrides, e.g. `SSEHUB__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "SSEHUB";

/// Largest accepted `broker.queue_capacity`. Every subscriber allocates its
/// whole queue up front.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// Loads the configuration from `config/default` (if present) and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from an optional file plus environment variables
/// and merges it over the default values.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = Settings::merged(partial);

    let capacity = settings.broker.queue_capacity;
    if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
        return Err(ConfigError::Message(format!(
            "broker.queue_capacity must be between 1 and {MAX_QUEUE_CAPACITY}, got {capacity}"
        )));
    }

    Ok(settings)
}
