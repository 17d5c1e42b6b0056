/// Errors that can occur while constructing or running the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A required configuration field was not supplied.
    #[error("missing required config field: {0}")]
    MissingConfig(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
