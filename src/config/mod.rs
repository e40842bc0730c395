// Configuration management module
// Resolves runtime settings from the environment and renders them for display

pub mod display;
pub mod settings;

#[cfg(test)]
mod tests;

pub use display::{mask_key, show_config};
pub use settings::{
    Config, ConfigError, DEFAULT_LOG_LEVEL, EnvFile, MIN_CHUNK_SIZE, ProviderSettings, StorageUrl,
};
