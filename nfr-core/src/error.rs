//! Error taxonomy for the catalog engine.
//!
//! Store failures propagate unchanged; not-found conditions are
//! structured values the caller can render as an empty state rather
//! than a fault. An attempt to link an already-linked pair is not an
//! error at all (see `links::LinkOutcome`).

use thiserror::Error;

/// Failure of the underlying key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Engine-level error for the operation surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("catalog not found: {0}")]
    CatalogNotFound(String),
    #[error("requirement not found: {0}")]
    RequirementNotFound(String),
    #[error("work item not found: {0}")]
    WorkItemNotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
