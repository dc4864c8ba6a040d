//! Demo scenarios: reproducible passenger sets for runs without a backend.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dispatch::{PassengerRequest, PendingSet};
use crate::geo::Coordinate;

/// Default bounding box: a ~11 km square north-east of (12.0, 123.0).
const DEFAULT_LAT_MIN: f64 = 12.0;
const DEFAULT_LAT_MAX: f64 = 12.1;
const DEFAULT_LNG_MIN: f64 = 123.0;
const DEFAULT_LNG_MAX: f64 = 123.1;

const DEFAULT_PASSENGER_COUNT: usize = 5;

/// Parameters for generating waiting passengers.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioParams {
    pub passenger_count: usize,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
    /// Seed for RNG (for reproducibility). `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            passenger_count: DEFAULT_PASSENGER_COUNT,
            lat_min: DEFAULT_LAT_MIN,
            lat_max: DEFAULT_LAT_MAX,
            lng_min: DEFAULT_LNG_MIN,
            lng_max: DEFAULT_LNG_MAX,
            seed: None,
        }
    }
}

impl ScenarioParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_passenger_count(mut self, count: usize) -> Self {
        self.passenger_count = count;
        self
    }

    pub fn with_bounds(mut self, lat_min: f64, lat_max: f64, lng_min: f64, lng_max: f64) -> Self {
        self.lat_min = lat_min.min(lat_max);
        self.lat_max = lat_min.max(lat_max);
        self.lng_min = lng_min.min(lng_max);
        self.lng_max = lng_min.max(lng_max);
        self
    }

    /// Centre of the bounding box, a sensible default vehicle start.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.lat_min + self.lat_max) / 2.0,
            (self.lng_min + self.lng_max) / 2.0,
        )
    }

    /// Generate `passenger_count` passengers uniformly inside the bounding box.
    pub fn generate(&self) -> PendingSet {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        (0..self.passenger_count)
            .map(|n| {
                let latitude = sample(&mut rng, self.lat_min, self.lat_max);
                let longitude = sample(&mut rng, self.lng_min, self.lng_max);
                PassengerRequest::new(
                    format!("passenger-{}", n + 1),
                    Coordinate::new(latitude, longitude),
                )
            })
            .collect()
    }
}

fn sample(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}
