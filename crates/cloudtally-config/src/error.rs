use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - current directory: cloudtally.yaml, .cloudtally.yaml\n\
        - ~/.config/cloudtally/config.yaml\n\
        Set CLOUDTALLY_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
