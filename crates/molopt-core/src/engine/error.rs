use thiserror::Error;

use super::config::ConfigError;
use super::prompt::PromptError;
use crate::core::models::trace::ClassificationTag;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid diversity threshold: {0}")]
    InvalidThreshold(f64),

    #[error("Trace for '{identity}' is already tagged {tag} and cannot enter the population")]
    PreassignedTag {
        identity: String,
        tag: ClassificationTag,
    },

    #[error("Inconsistent population state: {0}")]
    InconsistentState(String),

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Prompt rendering failed: {source}")]
    Prompt {
        #[from]
        source: PromptError,
    },
}
