use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use pickup_core::adapters::{PassengerSource, PositionSink};
use pickup_core::config::TrackerConfig;
use pickup_core::dispatch::{PassengerRequest, PendingSet};
use pickup_core::error::{ReportError, SourceError};
use pickup_core::geo::Coordinate;
use pickup_core::orchestrator::Orchestrator;
use pickup_core::routing::{RouteFetcher, StraightLineFetcher};
use pickup_core::session::{session, SessionCancel, SessionHandle};
use pickup_core::test_helpers::{test_collaborators, RecordingSink, TEST_ORIGIN};
use pickup_core::vehicle::{VehicleState, VehicleTracker};

/// Builder for orchestrators wired to in-process collaborators.
pub struct TestSessionBuilder {
    config: TrackerConfig,
    start: Coordinate,
    pending: PendingSet,
    routes: Arc<dyn RouteFetcher>,
    sink: Arc<dyn PositionSink>,
    passengers: Option<Arc<dyn PassengerSource>>,
}

impl TestSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            start: TEST_ORIGIN,
            pending: PendingSet::new(),
            routes: Arc::new(StraightLineFetcher),
            sink: Arc::new(RecordingSink::new()),
            passengers: None,
        }
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_start(mut self, start: Coordinate) -> Self {
        self.start = start;
        self
    }

    pub fn with_pending(mut self, pending: PendingSet) -> Self {
        self.pending = pending;
        self
    }

    pub fn with_routes(mut self, routes: Arc<dyn RouteFetcher>) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PositionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_passenger_source(mut self, source: Arc<dyn PassengerSource>) -> Self {
        self.passengers = Some(source);
        self
    }

    /// Build a live session; keep the handle alive for as long as the session should run.
    pub fn build(self) -> (Orchestrator, SessionHandle) {
        let (handle, cancel) = session();
        (self.build_with_cancel(cancel), handle)
    }

    pub fn build_with_cancel(self, cancel: SessionCancel) -> Orchestrator {
        let mut collaborators = test_collaborators(&self.pending, self.sink);
        collaborators.routes = self.routes;
        if let Some(source) = self.passengers {
            collaborators.passengers = source;
        }
        Orchestrator::new(self.config, collaborators, self.start, self.pending, cancel)
            .expect("valid test configuration")
    }
}

/// Cancels the session from inside the `after`-th report.
pub struct CancellingSink {
    after: usize,
    handle: Arc<SessionHandle>,
    pub delivered: RecordingSink,
}

impl CancellingSink {
    pub fn new(after: usize, handle: Arc<SessionHandle>) -> Self {
        Self {
            after,
            handle,
            delivered: RecordingSink::new(),
        }
    }
}

#[async_trait]
impl PositionSink for CancellingSink {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError> {
        self.delivered.report(position).await?;
        if self.delivered.len() == self.after {
            self.handle.cancel();
        }
        Ok(())
    }
}

/// Records the vehicle state a reader observes at every report.
#[derive(Default)]
pub struct ObservingSink {
    tracker: OnceLock<VehicleTracker>,
    observed: Mutex<Vec<VehicleState>>,
}

impl ObservingSink {
    pub fn attach(&self, tracker: VehicleTracker) {
        let _ = self.tracker.set(tracker);
    }

    pub fn observed(&self) -> Vec<VehicleState> {
        self.observed.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PositionSink for ObservingSink {
    async fn report(&self, _position: Coordinate) -> Result<(), ReportError> {
        if let Some(tracker) = self.tracker.get() {
            self.observed.lock().expect("lock").push(tracker.snapshot());
        }
        Ok(())
    }
}

/// Hands out scripted snapshots in order, repeating the last one.
pub struct ScriptedPassengers {
    snapshots: Mutex<VecDeque<Result<Vec<PassengerRequest>, String>>>,
    last: Mutex<Vec<PassengerRequest>>,
}

impl ScriptedPassengers {
    pub fn new(snapshots: Vec<Result<Vec<PassengerRequest>, String>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            last: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PassengerSource for ScriptedPassengers {
    async fn pending_passengers(&self) -> Result<Vec<PassengerRequest>, SourceError> {
        let next = self.snapshots.lock().expect("lock").pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last.lock().expect("lock") = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(message)) => Err(SourceError::Unavailable(message)),
            None => Ok(self.last.lock().expect("lock").clone()),
        }
    }
}

/// Takes `delay` to acknowledge each report.
pub struct SlowSink {
    delay: Duration,
    pub started: AtomicUsize,
    pub delivered: RecordingSink,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            delivered: RecordingSink::new(),
        }
    }
}

#[async_trait]
impl PositionSink for SlowSink {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.delivered.report(position).await
    }
}
