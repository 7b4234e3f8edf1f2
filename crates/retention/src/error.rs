/// Crate-wide result type for the retention engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ebb_config::Error),

    #[error("invalid retention settings: {message}")]
    InvalidSettings { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }
}
