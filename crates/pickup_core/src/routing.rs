//! Routes and pluggable route fetchers.
//!
//! Implementations, selectable via [`RouteFetcherKind`]:
//!
//! - **`StraightLineFetcher`**: the two-waypoint route `[start, end]`. No dependencies.
//! - **`MapboxRouteFetcher`** (feature `http`): Mapbox Directions API, GeoJSON geometry.
//!
//! Remote fetchers are wrapped in a [`CachedRouteFetcher`] by [`build_route_fetcher`].

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, RouteError};
use crate::geo::{distance_km, Coordinate};

#[cfg(feature = "http")]
pub mod mapbox;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Ordered waypoints from the vehicle towards a passenger. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<Coordinate>,
}

impl Route {
    /// Build a route, rejecting empty or non-finite waypoint lists.
    pub fn new(waypoints: Vec<Coordinate>) -> Result<Self, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::Empty);
        }
        if let Some(index) = waypoints.iter().position(|w| !w.is_finite()) {
            return Err(RouteError::NonFinite(index));
        }
        Ok(Self { waypoints })
    }

    /// Build from GeoJSON-ordered `[longitude, latitude]` pairs.
    pub fn from_lng_lat(pairs: &[[f64; 2]]) -> Result<Self, RouteError> {
        Self::new(
            pairs
                .iter()
                .map(|[lng, lat]| Coordinate::new(*lat, *lng))
                .collect(),
        )
    }

    pub fn waypoints(&self) -> &[Coordinate] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn start(&self) -> Coordinate {
        self.waypoints[0]
    }

    pub fn destination(&self) -> Coordinate {
        self.waypoints[self.waypoints.len() - 1]
    }

    /// Consecutive waypoint pairs.
    pub fn segments(&self) -> impl Iterator<Item = (Coordinate, Coordinate)> + '_ {
        self.waypoints.windows(2).map(|pair| (pair[0], pair[1]))
    }

    /// Sum of haversine segment lengths in kilometres.
    pub fn distance_km(&self) -> f64 {
        self.segments().map(|(a, b)| distance_km(a, b)).sum()
    }
}

/// Routing backends. Implementations must be `Send + Sync` so one fetcher can be
/// shared by the orchestrator and anything observing it.
#[async_trait]
pub trait RouteFetcher: Send + Sync {
    /// Fetch a drivable route from `start` to `end`.
    async fn fetch_route(&self, start: Coordinate, end: Coordinate) -> Result<Route, RouteError>;
}

/// Which routing backend to use.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteFetcherKind {
    /// Drive straight from start to end.
    #[default]
    StraightLine,
    /// Mapbox Directions API. The access token is supplied separately.
    Mapbox {
        #[serde(default = "default_mapbox_endpoint")]
        endpoint: String,
        #[serde(default = "default_mapbox_profile")]
        profile: String,
    },
}

fn default_mapbox_endpoint() -> String {
    "https://api.mapbox.com".to_string()
}

fn default_mapbox_profile() -> String {
    "driving".to_string()
}

// ---------------------------------------------------------------------------
// Straight-line fetcher (always available)
// ---------------------------------------------------------------------------

/// Routes directly from start to end without consulting any service.
#[derive(Debug, Default, Clone, Copy)]
pub struct StraightLineFetcher;

#[async_trait]
impl RouteFetcher for StraightLineFetcher {
    async fn fetch_route(&self, start: Coordinate, end: Coordinate) -> Result<Route, RouteError> {
        Route::new(vec![start, end])
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

type RouteKey = ((u64, u64), (u64, u64));

/// LRU-cached wrapper around any [`RouteFetcher`].
///
/// The cache key is the directional bit pattern of both endpoints. Only
/// successful routes are cached. When `fallback_to_straight_line` is set, an
/// inner failure is answered with [`StraightLineFetcher`] instead.
pub struct CachedRouteFetcher {
    inner: Arc<dyn RouteFetcher>,
    cache: Mutex<LruCache<RouteKey, Route>>,
    fallback_to_straight_line: bool,
}

impl CachedRouteFetcher {
    pub fn new(
        inner: Arc<dyn RouteFetcher>,
        capacity: usize,
        fallback_to_straight_line: bool,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            fallback_to_straight_line,
        }
    }

    fn cached(&self, key: &RouteKey) -> Option<Route> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(key).cloned()
    }

    fn store(&self, key: RouteKey, route: &Route) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, route.clone());
        }
    }
}

#[async_trait]
impl RouteFetcher for CachedRouteFetcher {
    async fn fetch_route(&self, start: Coordinate, end: Coordinate) -> Result<Route, RouteError> {
        let key = (start.bits(), end.bits());

        if let Some(route) = self.cached(&key) {
            debug!(%start, %end, "route cache hit");
            return Ok(route);
        }

        match self.inner.fetch_route(start, end).await {
            Ok(route) => {
                self.store(key, &route);
                Ok(route)
            }
            Err(error) if self.fallback_to_straight_line => {
                warn!(%start, %end, %error, "route fetch failed, driving straight line instead");
                StraightLineFetcher.fetch_route(start, end).await
            }
            Err(error) => Err(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Construct a shared [`RouteFetcher`] from its descriptor.
///
/// - `StraightLine` is returned uncached.
/// - `Mapbox` requires `access_token` and the `http` feature; it is wrapped in a
///   [`CachedRouteFetcher`].
pub fn build_route_fetcher(
    kind: &RouteFetcherKind,
    access_token: Option<&str>,
    cache_capacity: usize,
    fallback_to_straight_line: bool,
) -> Result<Arc<dyn RouteFetcher>, ConfigError> {
    match kind {
        RouteFetcherKind::StraightLine => Ok(Arc::new(StraightLineFetcher)),

        #[cfg(feature = "http")]
        RouteFetcherKind::Mapbox { endpoint, profile } => {
            let token = access_token.ok_or_else(|| {
                ConfigError::Invalid("mapbox routing requires an access token".to_string())
            })?;
            let inner = mapbox::MapboxRouteFetcher::new(endpoint, profile, token)
                .map_err(|error| ConfigError::Invalid(error.to_string()))?;
            Ok(Arc::new(CachedRouteFetcher::new(
                Arc::new(inner),
                cache_capacity,
                fallback_to_straight_line,
            )))
        }

        #[cfg(not(feature = "http"))]
        RouteFetcherKind::Mapbox { .. } => {
            let _ = (access_token, cache_capacity, fallback_to_straight_line);
            Err(ConfigError::Invalid(
                "mapbox routing needs the `http` feature".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RouteFetcher for CountingFetcher {
        async fn fetch_route(
            &self,
            start: Coordinate,
            end: Coordinate,
        ) -> Result<Route, RouteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RouteError::NoRoute);
            }
            let mid = crate::geo::interpolate(start, end, 0.5);
            Route::new(vec![start, mid, end])
        }
    }

    #[test]
    fn empty_route_is_rejected() {
        assert!(matches!(Route::new(Vec::new()), Err(RouteError::Empty)));
    }

    #[test]
    fn non_finite_waypoint_is_rejected() {
        let result = Route::new(vec![
            Coordinate::new(12.0, 123.0),
            Coordinate::new(f64::INFINITY, 123.0),
        ]);
        assert!(matches!(result, Err(RouteError::NonFinite(1))));
    }

    #[test]
    fn from_lng_lat_swaps_axis_order() {
        let route = Route::from_lng_lat(&[[123.0, 12.0], [123.01, 12.01]]).expect("route");
        assert_eq!(route.start(), Coordinate::new(12.0, 123.0));
        assert_eq!(route.destination(), Coordinate::new(12.01, 123.01));
        assert_eq!(route.segments().count(), 1);
    }

    #[test]
    fn single_waypoint_route_has_no_segments() {
        let only = Coordinate::new(12.0, 123.0);
        let route = Route::new(vec![only]).expect("route");
        assert_eq!(route.start(), route.destination());
        assert_eq!(route.distance_km(), 0.0);
    }

    #[tokio::test]
    async fn straight_line_connects_endpoints() {
        let start = Coordinate::new(12.0, 123.0);
        let end = Coordinate::new(12.05, 123.05);
        let route = StraightLineFetcher.fetch_route(start, end).await.expect("route");
        assert_eq!(route.waypoints(), &[start, end]);
    }

    #[tokio::test]
    async fn cache_serves_repeat_requests() {
        let inner = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachedRouteFetcher::new(inner.clone(), 8, false);
        let start = Coordinate::new(12.0, 123.0);
        let end = Coordinate::new(12.05, 123.05);

        let first = cached.fetch_route(start, end).await.expect("route");
        let second = cached.fetch_route(start, end).await.expect("route");
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        // Direction matters.
        cached.fetch_route(end, start).await.expect("route");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_fall_back_to_straight_line_and_are_not_cached() {
        let inner = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cached = CachedRouteFetcher::new(inner.clone(), 8, true);
        let start = Coordinate::new(12.0, 123.0);
        let end = Coordinate::new(12.05, 123.05);

        let route = cached.fetch_route(start, end).await.expect("fallback route");
        assert_eq!(route.waypoints(), &[start, end]);
        cached.fetch_route(start, end).await.expect("fallback route");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_propagate_without_fallback() {
        let inner = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cached = CachedRouteFetcher::new(inner, 8, false);
        let result = cached
            .fetch_route(Coordinate::new(12.0, 123.0), Coordinate::new(12.05, 123.05))
            .await;
        assert!(matches!(result, Err(RouteError::NoRoute)));
    }

    #[test]
    fn kind_defaults_to_straight_line() {
        assert_eq!(RouteFetcherKind::default(), RouteFetcherKind::StraightLine);
    }

    #[test]
    fn mapbox_kind_fills_defaults_from_json() {
        let kind: RouteFetcherKind =
            serde_json::from_str(r#"{"kind":"mapbox"}"#).expect("valid kind");
        assert_eq!(
            kind,
            RouteFetcherKind::Mapbox {
                endpoint: "https://api.mapbox.com".to_string(),
                profile: "driving".to_string(),
            }
        );
    }

    #[test]
    fn build_straight_line_needs_no_token() {
        assert!(build_route_fetcher(&RouteFetcherKind::StraightLine, None, 16, true).is_ok());
    }
}
