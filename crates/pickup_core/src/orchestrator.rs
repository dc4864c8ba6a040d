//! The dispatch loop: pick the nearest passenger, fetch a route, drive it, pick up, repeat.
//!
//! State machine:
//!
//! ```text
//! Idle -> Dispatching -> Simulating -> Arrived -> Dispatching ... -> Done
//!              |              |
//!              |              +-- cancelled --> Idle
//!              +-- route failed --> Idle (passenger stays pending)
//! ```
//!
//! One cycle runs at a time; the vehicle's moving flag is held by a
//! [`MotionGuard`](crate::vehicle::MotionGuard) for exactly the duration of a drive.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapters::{LocationSource, PassengerSource, PositionSink};
use crate::config::{ResyncPolicy, TrackerConfig};
use crate::dispatch::{DispatchPolicy, NearestPassenger, PassengerId, PassengerRequest, PendingSet};
use crate::error::{RouteError, TrackerError, TrackerResult};
use crate::geo::{distance_km, Coordinate};
use crate::movement::{MovementSimulator, SimulationOutcome};
use crate::routing::{Route, RouteFetcher};
use crate::session::SessionCancel;
use crate::vehicle::VehicleTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Waiting for a position and a non-empty pending set.
    Idle,
    Dispatching,
    Simulating,
    Arrived,
    /// Terminal: nobody is left to pick up.
    Done,
}

/// External services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub location: Arc<dyn LocationSource>,
    pub passengers: Arc<dyn PassengerSource>,
    pub routes: Arc<dyn RouteFetcher>,
    pub sink: Arc<dyn PositionSink>,
}

/// Result of one dispatch cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    PickedUp {
        passenger: PassengerRequest,
        ticks: usize,
    },
    /// Nothing pending; the session is done.
    NoPassengers,
    /// The route could not be fetched; the passenger is still pending.
    RouteFailed {
        passenger: PassengerId,
        error: RouteError,
    },
    /// The session ended before the cycle finished.
    Cancelled { target: Option<PassengerId> },
}

/// What a finished (or cancelled) session achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub picked_up: Vec<PassengerId>,
    pub ticks: usize,
    pub reports_failed: usize,
    pub final_position: Coordinate,
    pub final_state: DispatchState,
    pub cancelled: bool,
}

pub struct Orchestrator {
    config: TrackerConfig,
    simulator: MovementSimulator,
    policy: Box<dyn DispatchPolicy>,
    passengers: Arc<dyn PassengerSource>,
    routes: Arc<dyn RouteFetcher>,
    sink: Arc<dyn PositionSink>,
    vehicle: VehicleTracker,
    pending: PendingSet,
    serviced: HashSet<PassengerId>,
    picked_up: Vec<PassengerId>,
    cancel: SessionCancel,
    state: watch::Sender<DispatchState>,
    ticks: usize,
    reports_failed: Arc<AtomicUsize>,
}

impl Orchestrator {
    /// Start a session: take the initial fix and the initial passenger snapshot.
    ///
    /// Fails with [`TrackerError::LocationUnavailable`] when there is no fix.
    pub async fn start(
        config: TrackerConfig,
        collaborators: Collaborators,
        cancel: SessionCancel,
    ) -> TrackerResult<Self> {
        config.validate()?;
        let position = collaborators.location.initial_fix().await?;
        let pending = PendingSet::from_requests(collaborators.passengers.pending_passengers().await?);
        info!(
            lat = position.latitude,
            lng = position.longitude,
            pending = pending.len(),
            "session started"
        );
        Self::new(config, collaborators, position, pending, cancel)
    }

    /// Build a session from an already known position and passenger set.
    pub fn new(
        config: TrackerConfig,
        collaborators: Collaborators,
        position: Coordinate,
        pending: PendingSet,
        cancel: SessionCancel,
    ) -> TrackerResult<Self> {
        let simulator = config.simulator()?;
        let (state, _) = watch::channel(DispatchState::Idle);
        Ok(Self {
            config,
            simulator,
            policy: Box::new(NearestPassenger),
            passengers: collaborators.passengers,
            routes: collaborators.routes,
            sink: collaborators.sink,
            vehicle: VehicleTracker::new(position),
            pending,
            serviced: HashSet::new(),
            picked_up: Vec::new(),
            cancel,
            state,
            ticks: 0,
            reports_failed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn DispatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Shared handle to the vehicle state, for observers.
    pub fn vehicle(&self) -> VehicleTracker {
        self.vehicle.clone()
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn state(&self) -> DispatchState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: DispatchState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "dispatch state");
        }
    }

    /// Drive cycles until nobody is left, the session ends, or routing keeps failing.
    ///
    /// Route failures are retried after `route_retry.delay_ms`; once
    /// `max_consecutive_failures` happen in a row the last one is returned as
    /// [`TrackerError::RouteFetchFailed`].
    pub async fn run(&mut self) -> TrackerResult<SessionSummary> {
        let mut consecutive_failures = 0;
        loop {
            match self.run_cycle().await? {
                CycleOutcome::PickedUp { .. } => consecutive_failures = 0,
                CycleOutcome::NoPassengers | CycleOutcome::Cancelled { .. } => break,
                CycleOutcome::RouteFailed { passenger, error } => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.route_retry.max_consecutive_failures {
                        warn!(%passenger, consecutive_failures, "giving up after repeated route failures");
                        return Err(TrackerError::RouteFetchFailed {
                            passenger,
                            source: error,
                        });
                    }
                    if !self.cancel.sleep(self.config.route_retry.delay()).await {
                        break;
                    }
                }
            }
        }
        Ok(self.summary())
    }

    /// Run exactly one Dispatching -> Simulating -> Arrived pass.
    pub async fn run_cycle(&mut self) -> TrackerResult<CycleOutcome> {
        if self.state() == DispatchState::Done {
            return Ok(CycleOutcome::NoPassengers);
        }
        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled { target: None });
        }
        if self.vehicle.is_moving() {
            return Err(TrackerError::AlreadyMoving);
        }

        self.set_state(DispatchState::Dispatching);
        self.resync().await;

        let origin = self.vehicle.position();
        let Some(target) = self.policy.select(origin, &self.pending).cloned() else {
            info!("no passengers pending, session done");
            self.set_state(DispatchState::Done);
            return Ok(CycleOutcome::NoPassengers);
        };
        info!(
            passenger = %target.id,
            distance_km = distance_km(origin, target.coordinate),
            pending = self.pending.len(),
            "dispatching to nearest passenger"
        );

        let route = match self.fetch_route(origin, target.coordinate).await {
            Some(Ok(route)) => route,
            Some(Err(error)) => {
                warn!(passenger = %target.id, %error, "route fetch failed, passenger stays pending");
                self.set_state(DispatchState::Idle);
                return Ok(CycleOutcome::RouteFailed {
                    passenger: target.id,
                    error,
                });
            }
            None => {
                self.set_state(DispatchState::Idle);
                return Ok(CycleOutcome::Cancelled {
                    target: Some(target.id),
                });
            }
        };

        let outcome = {
            let _motion = self.vehicle.begin_motion()?;
            self.set_state(DispatchState::Simulating);
            self.drive(&route).await
        };
        self.ticks += outcome.ticks();

        match outcome {
            SimulationOutcome::Cancelled { ticks, .. } => {
                info!(passenger = %target.id, ticks, "drive cancelled");
                self.set_state(DispatchState::Idle);
                Ok(CycleOutcome::Cancelled {
                    target: Some(target.id),
                })
            }
            SimulationOutcome::Completed { ticks, arrived_at } => {
                self.set_state(DispatchState::Arrived);
                self.vehicle.set_position(arrived_at);
                self.pending.complete_pickup(&target.id);
                self.serviced.insert(target.id.clone());
                self.picked_up.push(target.id.clone());
                info!(
                    passenger = %target.id,
                    ticks,
                    remaining = self.pending.len(),
                    "passenger picked up"
                );

                if self.pending.is_empty() {
                    let next = match self.config.resync {
                        ResyncPolicy::Never => DispatchState::Done,
                        ResyncPolicy::BetweenCycles => DispatchState::Idle,
                    };
                    self.set_state(next);
                }
                Ok(CycleOutcome::PickedUp {
                    passenger: target,
                    ticks,
                })
            }
        }
    }

    /// `None` when the session ended while waiting on the routing service.
    async fn fetch_route(
        &self,
        origin: Coordinate,
        target: Coordinate,
    ) -> Option<Result<Route, RouteError>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.routes.fetch_route(origin, target) => Some(result),
        }
    }

    async fn drive(&self, route: &Route) -> SimulationOutcome {
        let vehicle = self.vehicle.clone();
        let sink = Arc::clone(&self.sink);
        let reports_failed = Arc::clone(&self.reports_failed);
        let cancel = self.cancel.clone();

        // A report still in flight when the session ends is abandoned.
        self.simulator
            .simulate(route, &self.cancel, move |position| {
                vehicle.set_position(position);
                let sink = Arc::clone(&sink);
                let reports_failed = Arc::clone(&reports_failed);
                let cancel = cancel.clone();
                async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => debug!("position report abandoned, session ended"),
                        result = sink.report(position) => {
                            if let Err(error) = result {
                                reports_failed.fetch_add(1, Ordering::Relaxed);
                                warn!(%error, "position report dropped");
                            }
                        }
                    }
                }
            })
            .await
    }

    async fn resync(&mut self) {
        if self.config.resync != ResyncPolicy::BetweenCycles {
            return;
        }
        let snapshot = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            result = self.passengers.pending_passengers() => result,
        };
        match snapshot {
            Ok(snapshot) => {
                self.pending.replace_with_snapshot(snapshot, &self.serviced);
                debug!(pending = self.pending.len(), "passengers resynced");
            }
            Err(error) => warn!(%error, "passenger resync failed, keeping current set"),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            picked_up: self.picked_up.clone(),
            ticks: self.ticks,
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            final_position: self.vehicle.position(),
            final_state: self.state(),
            cancelled: self.cancel.is_cancelled(),
        }
    }
}
