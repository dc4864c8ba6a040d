//! Vehicle state shared between the orchestrator and its observers.
//!
//! One writer (the orchestrator) and any number of readers, each reading a
//! consistent [`VehicleState`] snapshot out of a watch channel.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::TrackerError;
use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Coordinate,
    /// Set while a route is being driven; no dispatch cycle may start meanwhile.
    pub moving: bool,
}

/// Cloneable handle to the live vehicle state.
#[derive(Debug, Clone)]
pub struct VehicleTracker {
    tx: Arc<watch::Sender<VehicleState>>,
}

impl VehicleTracker {
    pub fn new(position: Coordinate) -> Self {
        let (tx, _rx) = watch::channel(VehicleState {
            position,
            moving: false,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> VehicleState {
        *self.tx.borrow()
    }

    pub fn position(&self) -> Coordinate {
        self.tx.borrow().position
    }

    pub fn is_moving(&self) -> bool {
        self.tx.borrow().moving
    }

    /// Receiver notified on every position or motion change.
    pub fn subscribe(&self) -> watch::Receiver<VehicleState> {
        self.tx.subscribe()
    }

    pub fn set_position(&self, position: Coordinate) {
        self.tx.send_modify(|state| state.position = position);
    }

    /// Mark the vehicle as moving until the returned guard is dropped.
    ///
    /// Fails with [`TrackerError::AlreadyMoving`] if another guard is alive.
    pub fn begin_motion(&self) -> Result<MotionGuard, TrackerError> {
        let acquired = self.tx.send_if_modified(|state| {
            if state.moving {
                false
            } else {
                state.moving = true;
                true
            }
        });
        if acquired {
            Ok(MotionGuard {
                tracker: self.clone(),
            })
        } else {
            Err(TrackerError::AlreadyMoving)
        }
    }
}

/// Clears the moving flag when dropped, whatever path the drive took.
#[derive(Debug)]
pub struct MotionGuard {
    tracker: VehicleTracker,
}

impl Drop for MotionGuard {
    fn drop(&mut self) {
        self.tracker.tx.send_modify(|state| state.moving = false);
    }
}
