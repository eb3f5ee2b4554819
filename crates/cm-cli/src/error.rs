use std::fmt;

use cm_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Bad input from the caller.
    Validation(String),
    NotFound(String),
    AlreadySaved { id: String },
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::AlreadySaved { id } => write!(f, "item {id} already saved"),
            EngineError::Store(e) => write!(f, "store: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { id, .. } => EngineError::AlreadySaved { id },
            StoreError::NotFound { id } => EngineError::NotFound(id),
            other => EngineError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
