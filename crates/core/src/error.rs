use thiserror::Error;

/// Failures that can surface while wiring the commander together.
///
/// Everything below the orchestrator boundary degrades instead of
/// erroring; these variants only cover process setup.
#[derive(Error, Debug)]
pub enum CommanderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
