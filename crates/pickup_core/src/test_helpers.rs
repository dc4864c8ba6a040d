//! Test helpers for common test setup and utilities.
//!
//! Shared fixtures so unit tests, integration tests and benches use the same
//! geography and the same scripted collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::adapters::{FixedLocation, PositionSink, StaticPassengers};
use crate::dispatch::{PassengerRequest, PendingSet};
use crate::error::{ReportError, RouteError};
use crate::geo::{Coordinate, EARTH_RADIUS_KM};
use crate::orchestrator::Collaborators;
use crate::routing::{Route, RouteFetcher, StraightLineFetcher};

/// Vehicle start used across tests.
pub const TEST_ORIGIN: Coordinate = Coordinate::new(12.0, 123.0);

/// Passenger "A": about 1.5 km from the origin.
pub const PASSENGER_A: Coordinate = Coordinate::new(12.01, 123.01);

/// Passenger "B": about 7.7 km from the origin.
pub const PASSENGER_B: Coordinate = Coordinate::new(12.05, 123.05);

/// The point `km` kilometres due north of `origin`.
pub fn north_of(origin: Coordinate, km: f64) -> Coordinate {
    let degrees = km / (EARTH_RADIUS_KM * std::f64::consts::PI / 180.0);
    Coordinate::new(origin.latitude + degrees, origin.longitude)
}

/// The two-passenger set used by end-to-end scenarios: A then B.
pub fn two_passengers() -> PendingSet {
    PendingSet::from_requests([
        PassengerRequest::new("A", PASSENGER_A),
        PassengerRequest::new("B", PASSENGER_B),
    ])
}

/// Collaborators backed by fixed data, straight-line routes and `sink`.
pub fn test_collaborators(
    passengers: &PendingSet,
    sink: Arc<dyn PositionSink>,
) -> Collaborators {
    Collaborators {
        location: Arc::new(FixedLocation(TEST_ORIGIN)),
        passengers: Arc::new(StaticPassengers(passengers.iter().cloned().collect())),
        routes: Arc::new(StraightLineFetcher),
        sink,
    }
}

/// Records every reported position.
#[derive(Debug, Default)]
pub struct RecordingSink {
    positions: Mutex<Vec<Coordinate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> Vec<Coordinate> {
        self.positions
            .lock()
            .map(|positions| positions.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.positions.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PositionSink for RecordingSink {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError> {
        if let Ok(mut positions) = self.positions.lock() {
            positions.push(position);
        }
        Ok(())
    }
}

/// Rejects every `every`-th report, recording the rest.
#[derive(Debug)]
pub struct FlakySink {
    every: usize,
    calls: AtomicUsize,
    pub delivered: RecordingSink,
}

impl FlakySink {
    pub fn failing_every(every: usize) -> Self {
        Self {
            every: every.max(1),
            calls: AtomicUsize::new(0),
            delivered: RecordingSink::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSink for FlakySink {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call % self.every == 0 {
            return Err(ReportError::Rejected(format!("simulated outage on call {call}")));
        }
        self.delivered.report(position).await
    }
}

/// Fails the first `failures` requests, then routes in a straight line.
#[derive(Debug)]
pub struct FailingRouteFetcher {
    failures: usize,
    calls: AtomicUsize,
}

impl FailingRouteFetcher {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always() -> Self {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteFetcher for FailingRouteFetcher {
    async fn fetch_route(&self, start: Coordinate, end: Coordinate) -> Result<Route, RouteError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(RouteError::Api(format!("simulated routing outage #{}", call + 1)));
        }
        StraightLineFetcher.fetch_route(start, end).await
    }
}
