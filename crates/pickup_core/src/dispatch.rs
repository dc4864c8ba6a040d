//! Dispatching: pending passengers and next-target selection.
//!
//! [`PendingSet`] keeps passengers in insertion order so selection is
//! reproducible; removal is keyed by [`PassengerId`], never by coordinate, so two
//! passengers waiting at the same spot stay distinct.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geo::{distance_km, Coordinate};

/// Opaque, stable passenger identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassengerId(pub String);

impl PassengerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PassengerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PassengerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PassengerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A passenger waiting to be picked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerRequest {
    pub id: PassengerId,
    pub coordinate: Coordinate,
}

impl PassengerRequest {
    pub fn new(id: impl Into<PassengerId>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            coordinate,
        }
    }
}

/// Passengers still waiting for pickup, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSet {
    passengers: Vec<PassengerRequest>,
    ids: HashSet<PassengerId>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a snapshot. Later entries with an id already seen are ignored.
    pub fn from_requests(requests: impl IntoIterator<Item = PassengerRequest>) -> Self {
        let mut set = Self::new();
        for request in requests {
            if set.ids.insert(request.id.clone()) {
                set.passengers.push(request);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.passengers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passengers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PassengerRequest> {
        self.passengers.iter()
    }

    pub fn contains(&self, id: &PassengerId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &PassengerId) -> Option<&PassengerRequest> {
        self.passengers.iter().find(|p| &p.id == id)
    }

    /// Insert a passenger, or update the coordinate of an existing one in place.
    /// Returns `true` when the id was new.
    pub fn insert(&mut self, request: PassengerRequest) -> bool {
        if self.ids.insert(request.id.clone()) {
            self.passengers.push(request);
            return true;
        }
        if let Some(existing) = self.passengers.iter_mut().find(|p| p.id == request.id) {
            existing.coordinate = request.coordinate;
        }
        false
    }

    /// Remove the serviced passenger by identity.
    pub fn complete_pickup(&mut self, id: &PassengerId) -> Option<PassengerRequest> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.passengers.iter().position(|p| &p.id == id)?;
        Some(self.passengers.remove(index))
    }

    /// Replace contents with a fresh snapshot, never re-admitting `serviced` ids.
    pub fn replace_with_snapshot(
        &mut self,
        snapshot: impl IntoIterator<Item = PassengerRequest>,
        serviced: &HashSet<PassengerId>,
    ) {
        *self = Self::from_requests(snapshot.into_iter().filter(|p| !serviced.contains(&p.id)));
    }
}

impl FromIterator<PassengerRequest> for PendingSet {
    fn from_iter<T: IntoIterator<Item = PassengerRequest>>(iter: T) -> Self {
        Self::from_requests(iter)
    }
}

/// Strategy choosing which pending passenger the vehicle services next.
///
/// Selection is read-only; the caller removes the passenger after pickup.
pub trait DispatchPolicy: Send + Sync {
    fn select<'a>(
        &self,
        vehicle: Coordinate,
        pending: &'a PendingSet,
    ) -> Option<&'a PassengerRequest>;
}

/// Nearest passenger by great-circle distance; the first in iteration order wins ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestPassenger;

impl DispatchPolicy for NearestPassenger {
    fn select<'a>(
        &self,
        vehicle: Coordinate,
        pending: &'a PendingSet,
    ) -> Option<&'a PassengerRequest> {
        select_nearest(vehicle, pending)
    }
}

/// Passenger closest to `vehicle`, or `None` when nothing is pending.
///
/// Passengers whose distance is NaN (non-finite coordinates) are never selected.
pub fn select_nearest(vehicle: Coordinate, pending: &PendingSet) -> Option<&PassengerRequest> {
    let mut best: Option<(&PassengerRequest, f64)> = None;
    for passenger in pending.iter() {
        let distance = distance_km(vehicle, passenger.coordinate);
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((passenger, distance)),
        }
    }
    best.map(|(passenger, _)| passenger)
}
