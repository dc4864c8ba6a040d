//! Driver-side tracker: picks up waiting passengers one by one, nearest first.
//!
//! Without `--backend-url` it runs a generated demo scenario and logs positions
//! instead of reporting them.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pickup_core::adapters::{FixedLocation, LogSink, PassengerSource, PositionSink, StaticPassengers};
use pickup_core::config::TrackerConfig;
use pickup_core::geo::Coordinate;
use pickup_core::logging::{init_logging, LogFormat};
use pickup_core::orchestrator::{Collaborators, Orchestrator, SessionSummary};
use pickup_core::routing::build_route_fetcher;
use pickup_core::scenario::ScenarioParams;
use pickup_core::session::session;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "pickup_driver",
    about = "Drive to waiting passengers, nearest first, reporting the vehicle position"
)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vehicle start latitude (defaults to the demo area centre)
    #[arg(long, requires = "start_lng", allow_hyphen_values = true)]
    start_lat: Option<f64>,

    /// Vehicle start longitude
    #[arg(long, requires = "start_lat", allow_hyphen_values = true)]
    start_lng: Option<f64>,

    /// Dispatch backend base URL
    #[cfg(feature = "http")]
    #[arg(long, env = "PICKUP_BACKEND_URL")]
    backend_url: Option<String>,

    /// Backend access token
    #[cfg(feature = "http")]
    #[arg(long, env = "PICKUP_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Routing service token, used when the config selects mapbox routing
    #[arg(long, env = "MAPBOX_ACCESS_TOKEN", hide_env_values = true)]
    mapbox_token: Option<String>,

    /// Number of generated passengers when running without a backend
    #[arg(long, default_value_t = 5)]
    demo_passengers: usize,

    /// Seed for the demo scenario
    #[arg(long)]
    seed: Option<u64>,

    /// Override the configured log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    init_logging(&config.logging);

    let mut scenario = ScenarioParams::default().with_passenger_count(cli.demo_passengers);
    if let Some(seed) = cli.seed {
        scenario = scenario.with_seed(seed);
    }
    let start = match (cli.start_lat, cli.start_lng) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
        _ => scenario.center(),
    };

    let routes = build_route_fetcher(
        &config.route,
        cli.mapbox_token.as_deref(),
        config.route_cache_capacity,
        config.fallback_to_straight_line,
    )?;
    let (passengers, sink) = passenger_side(&cli, &scenario)?;
    let collaborators = Collaborators {
        location: Arc::new(FixedLocation(start)),
        passengers,
        routes,
        sink,
    };

    let (handle, cancel) = session();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, ending session"),
            Err(error) => warn!(%error, "cannot listen for interrupts, ending session"),
        }
        handle.cancel();
    });

    let mut orchestrator = Orchestrator::start(config, collaborators, cancel).await?;
    let summary = orchestrator.run().await?;
    print_summary(&summary)?;
    Ok(())
}

type PassengerSide = (Arc<dyn PassengerSource>, Arc<dyn PositionSink>);

#[cfg(feature = "http")]
fn passenger_side(cli: &Cli, scenario: &ScenarioParams) -> Result<PassengerSide, Box<dyn Error>> {
    use pickup_core::adapters::backend::BackendClient;
    use pickup_core::adapters::AccessToken;

    let Some(base_url) = cli.backend_url.as_deref() else {
        return Ok(demo_side(scenario));
    };
    let token = cli
        .access_token
        .as_deref()
        .ok_or("--backend-url needs an access token (PICKUP_ACCESS_TOKEN)")?;
    let client = Arc::new(BackendClient::new(base_url, AccessToken::new(token))?);
    info!(backend = base_url, "using dispatch backend");
    let passengers: Arc<dyn PassengerSource> = client.clone();
    let sink: Arc<dyn PositionSink> = client;
    Ok((passengers, sink))
}

#[cfg(not(feature = "http"))]
fn passenger_side(_cli: &Cli, scenario: &ScenarioParams) -> Result<PassengerSide, Box<dyn Error>> {
    Ok(demo_side(scenario))
}

fn demo_side(scenario: &ScenarioParams) -> PassengerSide {
    let passengers = scenario.generate();
    info!(passengers = passengers.len(), "running demo scenario");
    let source: Arc<dyn PassengerSource> =
        Arc::new(StaticPassengers(passengers.iter().cloned().collect()));
    let sink: Arc<dyn PositionSink> = Arc::new(LogSink);
    (source, sink)
}

fn print_summary(summary: &SessionSummary) -> Result<(), serde_json::Error> {
    let report = serde_json::json!({
        "picked_up": summary.picked_up.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        "ticks": summary.ticks,
        "reports_failed": summary.reports_failed,
        "final_position": {
            "latitude": summary.final_position.latitude,
            "longitude": summary.final_position.longitude,
        },
        "final_state": format!("{:?}", summary.final_state),
        "cancelled": summary.cancelled,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
