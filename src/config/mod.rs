mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    CacheSettings, ConsumerSettings, HttpSettings, HubSettings, LogSettings, LoggingSettings,
    ServerSettings, Settings, StoreSettings,
};

/// Environment variable prefix, e.g. `CHATRELAY_SERVER__PORT=9001`.
pub const ENV_PREFIX: &str = "CHATRELAY";

/// Loads the configuration from `config/default` and environment variables,
/// merged over default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new("config/default"))
}

/// Same as [`load_config`] with an explicit file path (extension optional).
/// A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
