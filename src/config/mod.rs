mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{RelaySettings, ServerSettings, Settings};

/// Prefix for environment overrides, e.g. `CHANRELAY_RELAY__SINK_CAPACITY=64`.
pub const ENV_PREFIX: &str = "CHANRELAY";

/// Loads the configuration from `config/default` and environment variables,
/// merged over the default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] but reads the (optional) file at `path`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}
