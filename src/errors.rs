use thiserror::Error;

use copro_config::ConfigError;
use copro_engine::CoreError;

/// Errors surfaced by the facade crate.
#[derive(Debug, Error)]
pub enum CoproError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoproError {
    /// Message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            CoproError::Core(err) => err.user_message(),
            CoproError::Config(err) => err.to_string(),
            CoproError::Io(err) => format!("IO error: {err}"),
        }
    }
}
