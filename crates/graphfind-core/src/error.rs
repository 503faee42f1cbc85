//! Configuration errors raised by the search pipeline.
//!
//! Everything else (store connectivity, malformed SQL at the engine level)
//! travels as a plain [`anyhow::Error`]. These variants are wrapped in
//! `anyhow::Error` as well; callers that need to tell a broken search
//! configuration apart from a data-access failure use
//! `err.downcast_ref::<SearchError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// A configured field does not exist on the class it is searched on.
    #[error("table '{class}' has no field '{field}'")]
    FieldNotFound { class: String, field: String },

    /// The request failed validation before any query was issued.
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    /// The caller targeted a data source that is not configured.
    #[error("data source not found: {0}")]
    UnknownSource(String),
}

impl SearchError {
    /// Whether the error points at a broken configuration rather than at the
    /// caller's target.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SearchError::FieldNotFound { .. } | SearchError::InvalidRequest(_)
        )
    }
}
