use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpcomingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
