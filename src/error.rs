use thiserror::Error;

/// Fatal errors that abort an entire benchmark run.
///
/// Everything else (transport failures, non-2xx responses, malformed stream
/// fragments) is captured per-request inside a [`crate::executor::RequestOutcome`]
/// and folded into the aggregate success/failure rates.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    /// Invalid configuration detected before any request is dispatched,
    /// e.g. a non-positive burstiness factor or an empty descriptor set.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The mandatory single-request trial failed. The run is aborted before
    /// any further dispatch because the remaining requests would fail the
    /// same way.
    #[error("smoke test failed: {0}")]
    SmokeTest(String),
}

/// A transport-level request failure: connection refused, timeout, or a
/// read error while consuming the response stream.
///
/// This is the only error class the retry policy acts on. A well-formed
/// non-2xx response is *not* a transport error; the executor reports it as a
/// cleanly failed outcome instead.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = BenchmarkError::Configuration("burstiness must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: burstiness must be positive"
        );
    }

    #[test]
    fn test_smoke_test_error_message() {
        let err = BenchmarkError::SmokeTest("HTTP error: 401".to_string());
        assert!(err.to_string().starts_with("smoke test failed:"));
    }
}
