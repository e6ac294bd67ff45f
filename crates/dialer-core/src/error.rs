use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("phone number is required")]
    EmptyPhone,
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("agent name is required")]
    EmptyAgentName,
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
    #[error("invalid lead status: {0}")]
    InvalidLeadStatus(String),
    #[error("invalid call status: {0}")]
    InvalidCallStatus(String),
    #[error("unknown provider status: {0}")]
    UnknownProviderStatus(String),
    #[error("invalid max attempts: {0}")]
    InvalidMaxAttempts(i32),
    #[error("invalid retry delay: {0}")]
    InvalidRetryDelay(i64),
    #[error("invalid duration: {0}")]
    InvalidDuration(i64),
}
