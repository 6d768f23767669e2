//! Error types for the vitals_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vitals_core operations.
///
/// Most of these never cross the public `HealthService` boundary: read paths
/// absorb them into empty results and write paths into `false`. They exist so
/// the internals can propagate with `?` and log one precise reason.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host has no usable health store
    #[error("Health data is not supported on this platform")]
    UnsupportedPlatform,

    /// Could not fetch the set of already-granted permissions
    #[error("Failed to fetch granted permissions: {0}")]
    PermissionFetch(String),

    /// The user declined one or more permissions
    #[error("Permissions denied: {0:?}")]
    PermissionDenied(Vec<String>),

    /// The platform failed while presenting or resolving the grant prompt
    #[error("Permission grant failed: {0}")]
    PlatformGrant(String),

    /// Canonical record could not be converted to a native record
    #[error("Encode error: {0}")]
    Encode(String),

    /// Native record could not be converted to a canonical record
    #[error("Decode error: {0}")]
    Decode(String),

    /// Native store rejected an insert
    #[error("Write error: {0}")]
    Write(String),

    /// Native store failed while reading
    #[error("Store error: {0}")]
    Store(String),

    /// Time range bounds are inverted or not representable
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    /// The caller's cancellation token fired
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// An operation was aborted because its cancellation token fired.
///
/// This is the only failure the public capability interface lets through;
/// everything else becomes a typed result, an empty list, `false` or `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Race `fut` against `token`, yielding `Cancelled` if the token fires first
/// (or had already fired).
pub async fn until_cancelled<F>(
    token: &tokio_util::sync::CancellationToken,
    fut: F,
) -> std::result::Result<F::Output, Cancelled>
where
    F: std::future::Future,
{
    if token.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
