use thiserror::Error;

/// Failures surfaced by the search and question-answering entry points.
///
/// An empty result set is not an error; callers get an empty row list and,
/// for questions, a found-nothing answer.
#[derive(Debug, Error)]
pub enum NavigatorError {
    /// A radius search was requested around a ZIP with no known centroid.
    #[error("no location is known for ZIP {zip}")]
    GeoLookup { zip: String },

    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// The assistant's proposal did not pass allow-list validation. The reason
    /// is for logs only.
    #[error("translation rejected: {reason}")]
    TranslationRejected { reason: String },

    #[error("translation assistant unavailable: {reason}")]
    TranslationUnavailable { reason: String },

    #[error("store error: {0}")]
    Store(#[from] duckdb::Error),
}

impl NavigatorError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::TranslationRejected {
            reason: reason.into(),
        }
    }
}

pub type NavigatorResult<T> = Result<T, NavigatorError>;
