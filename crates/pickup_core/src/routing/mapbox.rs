//! Mapbox Directions API route fetcher.
//!
//! Requests GeoJSON geometry and hands the first route's coordinate list to
//! [`Route::from_lng_lat`]; everything else in the response is ignored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{Route, RouteFetcher};
use crate::error::RouteError;
use crate::geo::Coordinate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin HTTP client for `/directions/v5/mapbox/{profile}`.
#[derive(Debug, Clone)]
pub struct MapboxRouteFetcher {
    client: Client,
    endpoint: String,
    profile: String,
    access_token: String,
}

impl MapboxRouteFetcher {
    /// Create a fetcher for `endpoint` (e.g. `https://api.mapbox.com`).
    pub fn new(endpoint: &str, profile: &str, access_token: &str) -> Result<Self, RouteError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            profile: profile.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn directions_url(&self, start: Coordinate, end: Coordinate) -> Result<Url, RouteError> {
        let base = format!(
            "{}/directions/v5/mapbox/{}/{},{};{},{}",
            self.endpoint,
            self.profile,
            start.longitude,
            start.latitude,
            end.longitude,
            end.latitude,
        );
        let mut url = Url::parse(&base)
            .map_err(|err| RouteError::Api(format!("failed to build Mapbox URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("geometries", "geojson")
            .append_pair("overview", "full")
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }
}

#[async_trait]
impl RouteFetcher for MapboxRouteFetcher {
    async fn fetch_route(&self, start: Coordinate, end: Coordinate) -> Result<Route, RouteError> {
        let url = self.directions_url(start, end)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let parsed: DirectionsResponse = response.json().await?;
        let route = parse_directions_response(parsed)?;
        debug!(
            waypoints = route.len(),
            distance_km = route.distance_km(),
            "mapbox route received"
        );
        Ok(route)
    }
}

#[derive(Deserialize)]
struct DirectionsResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    geometry: LineString,
}

#[derive(Deserialize)]
struct LineString {
    coordinates: Vec<[f64; 2]>, // [lng, lat]
}

fn parse_directions_response(resp: DirectionsResponse) -> Result<Route, RouteError> {
    if resp.code != "Ok" {
        return Err(match resp.code.as_str() {
            "NoRoute" | "NoSegment" => RouteError::NoRoute,
            _ => RouteError::Api(resp.message.unwrap_or(resp.code)),
        });
    }
    let route = resp.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
    Route::from_lng_lat(&route.geometry.coordinates)
}
