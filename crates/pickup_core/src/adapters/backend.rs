//! HTTP client for the dispatch backend.
//!
//! Reads the waiting passengers and receives live vehicle positions. Every
//! request carries the session's [`AccessToken`] in the `x-access-token` header.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AccessToken, PassengerSource, PositionSink};
use crate::dispatch::{PassengerId, PassengerRequest};
use crate::error::{ReportError, SourceError};
use crate::geo::Coordinate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const ACCESS_TOKEN_HEADER: &str = "x-access-token";
const PASSENGERS_PATH: &str = "api/getJeepAndPassengerLocations";
const POSITION_PATH: &str = "updatedriverLocation";

/// Backend client implementing both [`PassengerSource`] and [`PositionSink`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base: Url,
    token: AccessToken,
}

impl BackendClient {
    /// Create a client for `base_url` (e.g. `https://dispatch.example.com`).
    pub fn new(base_url: &str, token: AccessToken) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|err| SourceError::Unavailable(format!("invalid backend URL: {err}")))?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url, String> {
        self.base
            .join(path)
            .map_err(|err| format!("failed to build backend URL: {err}"))
    }
}

#[async_trait]
impl PassengerSource for BackendClient {
    async fn pending_passengers(&self) -> Result<Vec<PassengerRequest>, SourceError> {
        let url = self.url(PASSENGERS_PATH).map_err(SourceError::Unavailable)?;
        let response = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, self.token.expose())
            .send()
            .await?
            .error_for_status()?;
        let body: PassengerLocationsResponse = response.json().await?;
        parse_passenger_locations(body)
    }
}

#[async_trait]
impl PositionSink for BackendClient {
    async fn report(&self, position: Coordinate) -> Result<(), ReportError> {
        let url = self.url(POSITION_PATH).map_err(ReportError::Rejected)?;
        self.client
            .post(url)
            .header(ACCESS_TOKEN_HEADER, self.token.expose())
            .json(&PositionReport::from(position))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct PositionReport {
    latitude: f64,
    longitude: f64,
}

impl From<Coordinate> for PositionReport {
    fn from(c: Coordinate) -> Self {
        Self {
            latitude: c.latitude,
            longitude: c.longitude,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PassengerLocationsResponse {
    #[serde(default)]
    passenger_locations: Vec<PassengerLocation>,
}

#[derive(Deserialize)]
struct PassengerLocation {
    #[serde(default, alias = "passenger_id", alias = "user_id")]
    id: Option<Value>,
    latitude: f64,
    longitude: f64,
}

/// Entries without a usable id are keyed by their coordinate, so the id survives
/// other passengers joining or leaving the list. Repeats of one coordinate get an
/// occurrence suffix (`-1`, `-2`, ...).
fn parse_passenger_locations(
    body: PassengerLocationsResponse,
) -> Result<Vec<PassengerRequest>, SourceError> {
    let mut occurrences: HashMap<(u64, u64), usize> = HashMap::new();
    body.passenger_locations
        .into_iter()
        .enumerate()
        .map(|(index, location)| {
            let coordinate = Coordinate::new(location.latitude, location.longitude);
            if !coordinate.is_finite() {
                return Err(SourceError::Malformed(format!(
                    "passenger at index {index} has a non-finite coordinate"
                )));
            }
            let id = match location.id {
                Some(Value::String(id)) if !id.trim().is_empty() => PassengerId(id),
                Some(Value::Number(id)) => PassengerId(id.to_string()),
                _ => coordinate_id(coordinate, &mut occurrences),
            };
            Ok(PassengerRequest { id, coordinate })
        })
        .collect()
}

fn coordinate_id(
    coordinate: Coordinate,
    occurrences: &mut HashMap<(u64, u64), usize>,
) -> PassengerId {
    let (lat, lng) = coordinate.bits();
    let seen = occurrences.entry((lat, lng)).or_insert(0);
    let id = match *seen {
        0 => format!("p{lat:016x}{lng:016x}"),
        n => format!("p{lat:016x}{lng:016x}-{n}"),
    };
    *seen += 1;
    PassengerId(id)
}
