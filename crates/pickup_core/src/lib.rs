//! Live pickup tracking for a single vehicle.
//!
//! The vehicle repeatedly drives to the nearest waiting passenger along a
//! fetched route, reporting an interpolated position on every tick, until no
//! passengers remain or the session is cancelled.

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod logging;
pub mod movement;
pub mod orchestrator;
pub mod routing;
pub mod scenario;
pub mod session;
pub mod vehicle;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
