pub type Result<T> = std::result::Result<T, Error>;

/// Only configuration can fail. Sanitization itself is infallible: invalid
/// input degrades to stripped text rather than surfacing an error, because a
/// sanitize call sits on the hot path of page rendering and outbound email
/// composition and must never interrupt either.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid public base URL `{url}`: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("the public base URL has already been initialized for this process")]
    BaseUrlAlreadySet,
}
