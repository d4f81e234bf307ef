use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// A listener or middleware layer failed; the firing was abandoned.
    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),
}
