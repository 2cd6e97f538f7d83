use thiserror::Error;

/// Failure while talking to the feed backend over HTTP.
///
/// `NotFound` on the first page is the "paging unsupported" signal and is
/// consumed by [`crate::PaginationClient`]; every other variant is transient
/// and leaves the feed untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("endpoint not found")]
    NotFound,
    #[error("server returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }
}

/// A realtime message that could not be decoded. Always discarded.
#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("not json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("new_image notification without a url")]
    MissingUrl,
}
