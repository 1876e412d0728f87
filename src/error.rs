use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubsyncError {
    #[error("{0}")]
    Parse(String),

    #[error("Failed to load '{resource}': {cause}")]
    ResourceLoad { resource: String, cause: String },

    #[error("No track has been loaded")]
    EngineNotLoaded,

    #[error("The engine bridge shut down before the command ran")]
    BridgeClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SubsyncError>;
