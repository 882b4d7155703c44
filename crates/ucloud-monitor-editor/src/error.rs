//! Error types returned by the editor core.
use thiserror::Error;

/// Errors that can occur when fetching a resource from the backend.
///
/// These never reach the user: the option loader logs them and falls back to an
/// empty option list.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request could not be sent or the response could not be read.
    #[error("error calling resource {resource}: {source}")]
    Transport {
        /// The resource being called.
        resource: String,
        /// The underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The resource responded with a non-success status.
    #[error("resource {resource} returned status {status}: {body}")]
    Status {
        /// The resource being called.
        resource: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, which usually holds `{"error": ...}`.
        body: String,
    },
    /// The response body was not valid JSON.
    #[error("invalid JSON from resource {resource}: {source}")]
    Decode {
        /// The resource being called.
        resource: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
    /// The request URL could not be built.
    #[error("invalid resource URL: {0}")]
    Url(String),
}

/// Errors interpreting a free-form variable query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VariableQueryError {
    /// The query string was not a JSON object.
    #[error("variable query is not valid JSON (got {query}): {source}")]
    InvalidJson {
        /// The raw query string.
        query: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
    /// The query named an unknown lookup action.
    #[error(transparent)]
    UnknownAction(#[from] crate::params::UnknownAction),
}
