/// Failure of an external synthesis or edit call.
///
/// Callers only distinguish success from failure; the variants exist for
/// logging and user-facing messages.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status code.
    #[error("Synthesis API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service answered but the payload was unusable.
    #[error("Malformed synthesis response: {0}")]
    MalformedResponse(String),

    /// The provider declined the request (quota, safety filter, ...).
    #[error("Synthesis rejected: {0}")]
    Rejected(String),
}
