//! Movement simulation: walks a [`Route`] at constant speed on a fixed tick cadence.
//!
//! Each segment is cut into `floor(traversal_ms / tick_ms)` interpolated positions.
//! A segment too short for a single tick contributes only its starting waypoint,
//! so every waypoint is still visited. The route's destination is always the last
//! position emitted, exactly, however the step counts rounded.
//!
//! [`MovementPlan`] is the pure position sequence; [`MovementSimulator::simulate`]
//! paces it in wall-clock time and stops at the next check once the session ends.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::geo::{distance_km, interpolate, Coordinate};
use crate::routing::Route;
use crate::session::SessionCancel;

const MS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;

/// Time to cover `distance_km` at `speed_kmh`, in milliseconds.
pub fn traversal_ms(distance_km: f64, speed_kmh: f64) -> f64 {
    if distance_km <= 0.0 {
        0.0
    } else {
        distance_km / speed_kmh * MS_PER_HOUR
    }
}

/// Number of interpolated positions for one segment.
pub fn segment_steps(start: Coordinate, end: Coordinate, speed_kmh: f64, tick_ms: u64) -> usize {
    let duration_ms = traversal_ms(distance_km(start, end), speed_kmh);
    (duration_ms / tick_ms as f64).floor() as usize
}

/// How a drive ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationOutcome {
    /// Every position was emitted, ending on the destination.
    Completed { ticks: usize, arrived_at: Coordinate },
    /// The session ended first; `last_position` is the last one emitted, if any.
    Cancelled {
        ticks: usize,
        last_position: Option<Coordinate>,
    },
}

impl SimulationOutcome {
    pub fn ticks(&self) -> usize {
        match self {
            Self::Completed { ticks, .. } | Self::Cancelled { ticks, .. } => *ticks,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct PlannedSegment {
    start: Coordinate,
    end: Coordinate,
    steps: usize,
}

/// Iterator over every position a drive emits, destination last.
#[derive(Debug, Clone)]
pub struct MovementPlan {
    segments: Vec<PlannedSegment>,
    destination: Coordinate,
    segment: usize,
    step: usize,
    finished: bool,
}

impl MovementPlan {
    pub fn new(route: &Route, speed_kmh: f64, tick_ms: u64) -> Self {
        let segments = route
            .segments()
            .map(|(start, end)| PlannedSegment {
                start,
                end,
                steps: segment_steps(start, end, speed_kmh, tick_ms),
            })
            .collect();
        Self {
            segments,
            destination: route.destination(),
            segment: 0,
            step: 0,
            finished: false,
        }
    }

    /// Interpolated positions emitted before the destination.
    pub fn intermediate_steps(&self) -> usize {
        self.segments.iter().map(|s| s.steps.max(1)).sum()
    }
}

impl Iterator for MovementPlan {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Coordinate> {
        if let Some(segment) = self.segments.get(self.segment) {
            if segment.steps == 0 {
                self.segment += 1;
                return Some(segment.start);
            }
            let fraction = self.step as f64 / segment.steps as f64;
            let position = interpolate(segment.start, segment.end, fraction);
            self.step += 1;
            if self.step >= segment.steps {
                self.segment += 1;
                self.step = 0;
            }
            return Some(position);
        }
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.destination)
    }
}

/// Drives routes at a constant speed, one position per tick.
#[derive(Debug, Clone, Copy)]
pub struct MovementSimulator {
    speed_kmh: f64,
    tick: Duration,
}

impl MovementSimulator {
    pub fn new(speed_kmh: f64, tick: Duration) -> Result<Self, ConfigError> {
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "speed must be a positive number of km/h, got {speed_kmh}"
            )));
        }
        if tick.as_millis() == 0 {
            return Err(ConfigError::Invalid(
                "tick interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(Self { speed_kmh, tick })
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn plan(&self, route: &Route) -> MovementPlan {
        MovementPlan::new(route, self.speed_kmh, self.tick.as_millis() as u64)
    }

    /// Emit every planned position through `on_tick`, waiting one tick between them.
    ///
    /// Cancellation is checked before each emission and during each wait; once the
    /// session has ended no further position is emitted.
    pub async fn simulate<F, Fut>(
        &self,
        route: &Route,
        cancel: &SessionCancel,
        mut on_tick: F,
    ) -> SimulationOutcome
    where
        F: FnMut(Coordinate) -> Fut,
        Fut: Future<Output = ()>,
    {
        let plan = self.plan(route);
        debug!(
            waypoints = route.len(),
            distance_km = route.distance_km(),
            steps = plan.intermediate_steps(),
            speed_kmh = self.speed_kmh,
            tick_ms = self.tick.as_millis() as u64,
            "starting drive"
        );

        let mut ticks = 0;
        let mut last_position = None;
        let mut positions = plan.peekable();

        while let Some(position) = positions.next() {
            if cancel.is_cancelled() {
                return SimulationOutcome::Cancelled {
                    ticks,
                    last_position,
                };
            }
            trace!(tick = ticks, lat = position.latitude, lng = position.longitude, "tick");
            on_tick(position).await;
            ticks += 1;
            last_position = Some(position);

            if positions.peek().is_none() {
                break;
            }
            if !cancel.sleep(self.tick).await {
                return SimulationOutcome::Cancelled {
                    ticks,
                    last_position,
                };
            }
        }

        SimulationOutcome::Completed {
            ticks,
            arrived_at: route.destination(),
        }
    }
}
