use dialer_core::CoreError;
use dialer_store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("no call attempt for provider call id {0}")]
    UnresolvableCallback(String),
    #[error("call {0} has no agent to connect")]
    NoAgentAssigned(String),
    #[error("call {0} has already ended")]
    CallEnded(String),
    #[error("dispatcher is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, EngineError>;
