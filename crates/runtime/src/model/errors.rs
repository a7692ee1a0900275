use thiserror::Error;

/// A failed call to the model endpoint.
///
/// Nothing retries at this level: the session surfaces the error to its
/// caller and keeps whatever history it had built up to that point.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The endpoint could not be reached.
    #[error("model endpoint unreachable: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("model endpoint rejected the request: {0}")]
    Api(String),

    /// The reply body did not parse.
    #[error("malformed model reply: {0}")]
    InvalidResponse(String),
}
