use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine a configuration directory; pass --config")]
    NoConfigDir,

    #[error("Invalid cookie `{0}`: expected name=value")]
    InvalidCookie(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Download of {episode_id} failed: {error}")]
    DownloadFailed { episode_id: String, error: String },

    #[error("Download of {0} was cancelled")]
    DownloadCancelled(String),

    #[error(transparent)]
    Engine(#[from] ferry_engine::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
