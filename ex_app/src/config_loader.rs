use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use ex_ratelimit::LimiterConfig;

/// Prefix of environment overrides, e.g. `EX_RATELIMIT__ACQUIRE__MAX_ATTEMPTS=10`
pub const ENV_PREFIX: &str = "EX_RATELIMIT";

/// Load limiter configuration from a TOML file, layered with environment overrides
///
/// Only deserialisation happens here; quota validation is left to the
/// coordinator so both paths report the same errors.
pub fn load_limiter_config<P: AsRef<Path>>(path: P) -> Result<LimiterConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path.as_ref()))
        .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__").try_parsing(true))
        .build()?;

    config.try_deserialize()
}

/// Load limiter configuration with fallback to the built-in presets
pub fn load_limiter_config_or_default(path: &str) -> LimiterConfig {
    match load_limiter_config(path) {
        Ok(config) => {
            tracing::info!("Loaded rate limit config from {path} ({} categories)", config.categories.len());
            config
        }
        Err(err) => {
            tracing::warn!("Failed to load rate limit config from {}: {}. Using built-in presets.", path, err);
            LimiterConfig::default()
        }
    }
}
