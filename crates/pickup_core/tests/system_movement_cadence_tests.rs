mod support;

use std::sync::Arc;
use std::time::Duration;

use pickup_core::config::TrackerConfig;
use pickup_core::dispatch::{PassengerRequest, PendingSet};
use pickup_core::geo::distance_km;
use pickup_core::movement::{MovementSimulator, SimulationOutcome};
use pickup_core::orchestrator::{CycleOutcome, DispatchState};
use pickup_core::routing::Route;
use pickup_core::session::session;
use pickup_core::test_helpers::{north_of, two_passengers, RecordingSink, PASSENGER_A, TEST_ORIGIN};
use tokio::time::Instant;

use support::session::{CancellingSink, ObservingSink, SlowSink, TestSessionBuilder};

#[tokio::test(start_paused = true)]
async fn four_km_at_forty_kmh_emits_one_position_per_second() {
    let destination = north_of(TEST_ORIGIN, 4.001);
    let route = Route::new(vec![TEST_ORIGIN, destination]).expect("valid route");
    let simulator = MovementSimulator::new(40.0, Duration::from_millis(1000)).expect("valid");
    let (_handle, cancel) = session();

    let expected_steps = (distance_km(TEST_ORIGIN, destination) / 40.0 * 3_600_000.0 / 1000.0)
        .floor() as usize;
    assert_eq!(expected_steps, 360);

    let started = Instant::now();
    let mut emitted = Vec::new();
    let outcome = simulator
        .simulate(&route, &cancel, |position| {
            emitted.push((position, started.elapsed()));
            async {}
        })
        .await;

    assert_eq!(emitted.len(), expected_steps + 1);
    assert!(matches!(outcome, SimulationOutcome::Completed { ticks: 361, .. }));

    let (last, last_at) = emitted.last().copied().expect("emissions");
    assert_eq!(last, destination);
    assert!(last_at >= Duration::from_secs(360));
    assert!(last_at < Duration::from_secs(361));
    assert_eq!(emitted[0].0, TEST_ORIGIN);

    for pair in emitted.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap >= Duration::from_millis(1000), "gap {gap:?}");
        assert!(gap < Duration::from_millis(1010), "gap {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_after_fifth_tick_stops_emission_and_clears_motion() {
    let (handle, cancel) = session();
    let handle = Arc::new(handle);
    let sink = Arc::new(CancellingSink::new(5, Arc::clone(&handle)));
    let mut orchestrator = TestSessionBuilder::new()
        .with_pending(PendingSet::from_requests([PassengerRequest::new("A", PASSENGER_A)]))
        .with_sink(sink.clone())
        .build_with_cancel(cancel);

    let outcome = orchestrator.run_cycle().await.expect("cycle");
    assert!(matches!(
        outcome,
        CycleOutcome::Cancelled { target: Some(ref id) } if id.as_str() == "A"
    ));
    assert_eq!(sink.delivered.len(), 5);
    assert!(!orchestrator.vehicle().is_moving());
    assert_eq!(orchestrator.state(), DispatchState::Idle);
    assert!(orchestrator.pending().contains(&"A".into()));

    let positions = sink.delivered.positions();
    assert_eq!(orchestrator.vehicle().position(), positions[4]);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(sink.delivered.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_wait_ends_session_within_one_tick() {
    let sink = Arc::new(RecordingSink::new());
    let (mut orchestrator, handle) = TestSessionBuilder::new()
        .with_pending(two_passengers())
        .with_sink(sink.clone())
        .build();

    let started = Instant::now();
    let cancel_later = async {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();
    };
    let (summary, ()) = tokio::join!(orchestrator.run(), cancel_later);
    let summary = summary.expect("cancellation is not an error");

    assert!(summary.cancelled);
    assert!(summary.picked_up.is_empty());
    assert_eq!(summary.ticks, 3);
    assert_eq!(sink.len(), 3);
    assert!(started.elapsed() < Duration::from_millis(3000));
    assert!(!orchestrator.vehicle().is_moving());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels_the_session() {
    let sink = Arc::new(RecordingSink::new());
    let (mut orchestrator, handle) = TestSessionBuilder::new()
        .with_pending(two_passengers())
        .with_sink(sink.clone())
        .build();
    drop(handle);

    let summary = orchestrator.run().await.expect("summary");
    assert!(summary.cancelled);
    assert!(sink.is_empty());
    assert_eq!(summary.final_position, TEST_ORIGIN);
}

#[tokio::test(start_paused = true)]
async fn observers_see_the_vehicle_moving_during_a_drive() {
    let sink = Arc::new(ObservingSink::default());
    let (mut orchestrator, _handle) = TestSessionBuilder::new()
        .with_config(TrackerConfig::default().with_tick_ms(250))
        .with_pending(PendingSet::from_requests([PassengerRequest::new("A", PASSENGER_A)]))
        .with_sink(sink.clone())
        .build();
    sink.attach(orchestrator.vehicle());

    let outcome = orchestrator.run_cycle().await.expect("cycle");
    assert!(matches!(outcome, CycleOutcome::PickedUp { .. }));

    let observed = sink.observed();
    assert!(!observed.is_empty());
    assert!(observed.iter().all(|state| state.moving));
    assert_eq!(observed.last().map(|state| state.position), Some(PASSENGER_A));
    assert!(!orchestrator.vehicle().is_moving());
}

#[tokio::test(start_paused = true)]
async fn cancel_is_not_held_off_by_a_slow_report() {
    let sink = Arc::new(SlowSink::new(Duration::from_secs(30)));
    let (mut orchestrator, handle) = TestSessionBuilder::new()
        .with_pending(two_passengers())
        .with_sink(sink.clone())
        .build();

    let started = Instant::now();
    let cancel_later = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    };
    let (summary, ()) = tokio::join!(orchestrator.run(), cancel_later);
    let summary = summary.expect("cancellation is not an error");

    assert!(summary.cancelled);
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.reports_failed, 0);
    assert!(!orchestrator.vehicle().is_moving());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.started.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(sink.delivered.is_empty());
}
