//! Provider error types.
//!
//! The enum itself lives in `onboardeval-core` so the feedback synthesizer
//! can classify failures; providers construct it and wrap it in `anyhow`.

pub use onboardeval_core::error::ProviderError;

/// Map a transport-level `reqwest` failure.
pub(crate) fn transport_error(e: &reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// The body of a response that failed to deserialize.
pub(crate) fn parse_error(e: &reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    }
}
