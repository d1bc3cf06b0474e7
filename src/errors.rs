use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decision-service transport failure or malformed decision payload.
    /// Fatal for the task once the bounded retries are exhausted.
    #[error("Decision error: {0}")]
    Decision(String),

    /// The model's response contained no action selection. Never downgraded
    /// to a default action.
    #[error("No action chosen: {0}")]
    NoActionChosen(String),

    /// The model named an action outside the closed vocabulary.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// Stale or unknown element id, or an out-of-range tab index.
    #[error("Element resolution error: {0}")]
    ElementResolution(String),

    /// Page-level action failure (click target covered, fill rejected, ...).
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl AgentError {
    /// Whether the execution loop may recover by surfacing the error to the
    /// model as feedback. Transport and schema failures are not recoverable:
    /// guessing past them could trigger irreversible page actions.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::Execution(_) | AgentError::ElementResolution(_) | AgentError::Image(_)
        )
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
