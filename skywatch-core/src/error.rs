use thiserror::Error;

/// Failure of a single location source.
///
/// Every variant cascades to the next source; the distinction only matters
/// for the message shown once the last fallback is reached. A timeout is
/// deliberately not a separate terminal state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("device location is not available on this host")]
    Unsupported,

    #[error("timed out waiting for a device fix")]
    Timeout,

    #[error("location lookup failed: {0}")]
    Lookup(String),

    #[error("no match found for \"{0}\"")]
    NoMatch(String),
}

/// Fatal aggregation error.
///
/// The aggregator tolerates every per-feed failure; the only thing it
/// rejects outright is being asked about a position that does not exist.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    #[error("coordinates out of range: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}
