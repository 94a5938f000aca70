use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MigrateError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid setting {name}: {value}")]
    InvalidSetting { name: String, value: String },

    #[error("Error message: {message} at {url}.")]
    Network { url: String, message: String },

    #[error("No response at {url}.")]
    EmptyResponse { url: String },

    #[error("invalid JSON document at {url}: {message}")]
    InvalidJson { url: String, message: String },

    #[error("missing data at {url}: {detail}")]
    MissingData { url: String, detail: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("index {index} out of range for {len} candidates")]
    OutOfRange { index: usize, len: usize },
}
