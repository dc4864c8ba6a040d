//! Collaborator seams: where the vehicle starts, who is waiting, where positions go.
//!
//! The orchestrator only sees these traits. Simple in-process implementations
//! live here; HTTP implementations against the dispatch backend are in
//! [`backend`] (feature `http`).

use async_trait::async_trait;
use tracing::info;

use crate::dispatch::PassengerRequest;
use crate::error::{LocationError, ReportError, SourceError};
use crate::geo::Coordinate;

#[cfg(feature = "http")]
pub mod backend;

/// Supplies the vehicle's initial position fix.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn initial_fix(&self) -> Result<Coordinate, LocationError>;
}

/// Supplies snapshots of passengers waiting for pickup.
#[async_trait]
pub trait PassengerSource: Send + Sync {
    async fn pending_passengers(&self) -> Result<Vec<PassengerRequest>, SourceError>;
}

/// Receives the vehicle's live position, once per tick. Best effort.
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError>;
}

/// Credential for the dispatch backend, handed over once at session start.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// A location source that always answers with the same fix.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinate);

#[async_trait]
impl LocationSource for FixedLocation {
    async fn initial_fix(&self) -> Result<Coordinate, LocationError> {
        if self.0.is_finite() {
            Ok(self.0)
        } else {
            Err(LocationError::Unavailable(format!(
                "fix {} is not a finite coordinate",
                self.0
            )))
        }
    }
}

/// A passenger source backed by a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticPassengers(pub Vec<PassengerRequest>);

#[async_trait]
impl PassengerSource for StaticPassengers {
    async fn pending_passengers(&self) -> Result<Vec<PassengerRequest>, SourceError> {
        Ok(self.0.clone())
    }
}

/// Writes each position to the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl PositionSink for LogSink {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError> {
        info!(
            lat = position.latitude,
            lng = position.longitude,
            "vehicle position"
        );
        Ok(())
    }
}
