//! Error types for the pickup tracker.
//!
//! Each collaborator seam has its own error enum; [`TrackerError`] is the
//! session-level error surfaced by the orchestrator. Cancellation is not an
//! error and never appears here.

use thiserror::Error;

use crate::dispatch::PassengerId;

/// Failure to obtain a drivable route from the routing collaborator.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("routing service returned no route")]
    NoRoute,

    #[error("routing service error: {0}")]
    Api(String),

    #[error("route must contain at least one waypoint")]
    Empty,

    #[error("route contains a non-finite waypoint at index {0}")]
    NonFinite(usize),

    #[cfg(feature = "http")]
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A single position report did not reach the sink.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("position sink rejected report: {0}")]
    Rejected(String),

    #[cfg(feature = "http")]
    #[error("position report failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The passenger source could not produce a snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("passenger source unavailable: {0}")]
    Unavailable(String),

    #[error("passenger source returned malformed data: {0}")]
    Malformed(String),

    #[cfg(feature = "http")]
    #[error("passenger request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// No initial fix could be obtained for the vehicle.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Session-level errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("session cannot start without an initial position: {0}")]
    LocationUnavailable(#[from] LocationError),

    #[error("route to passenger {passenger} could not be fetched: {source}")]
    RouteFetchFailed {
        passenger: PassengerId,
        #[source]
        source: RouteError,
    },

    #[error(transparent)]
    PassengerSource(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("vehicle is already moving; a new dispatch cycle cannot start")]
    AlreadyMoving,
}

/// Shorthand result type for session operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
