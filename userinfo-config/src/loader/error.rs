use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    FileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to load env file: {source}")]
    EnvFile {
        #[source]
        source: dotenvy::Error,
    },

    #[error("invalid server url '{value}': {source}")]
    InvalidServerUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported server url scheme '{scheme}', expected http or https")]
    UnsupportedScheme { scheme: String },

    #[error("invalid duration for {field} ('{value}'): {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid value for {field} ('{value}'): {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}
