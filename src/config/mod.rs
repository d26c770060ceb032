// Configuration management module
// TOML file, process environment and `.env` overlay

pub mod settings;


pub use settings::{
    CatalogConfig, Config, ConfigError, IndexConfig, ProviderConfig, ServerConfig,
};
