use thiserror::Error;

/// Error taxonomy for the hybrid beat detection pipeline.
#[derive(Error, Debug)]
pub enum BeatError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Resource missing: {0}")]
    ResourceMissing(String),

    #[error("Parser already initialized; configuration and plugins are frozen")]
    AlreadyInitialized,

    #[error("Plugin '{plugin}' failed: {source}")]
    PluginFailure {
        plugin: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Decode failure: {0}")]
    DecodeFailure(String),
}

pub type Result<T> = std::result::Result<T, BeatError>;

impl BeatError {
    pub fn plugin(name: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PluginFailure {
            plugin: name.into(),
            source: Box::new(source),
        }
    }
}
