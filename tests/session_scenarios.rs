use m18sim::{
    event_channel,
    mock::{MockCall, MockCharger},
    ChargerLink, ProfileSelection, SessionEvent, SessionOutcome, SessionSupervisor, SimError,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc::UnboundedReceiver, Mutex},
    time::Instant,
};

const OLD_CUTOFF: u32 = 300;
const OLD_MAX: u32 = 6000;

fn setup(
    mock: MockCharger,
) -> (
    SessionSupervisor<MockCharger>,
    Arc<Mutex<MockCharger>>,
    UnboundedReceiver<SessionEvent>,
) {
    let (observer, events) = event_channel();
    let link = Arc::new(Mutex::new(mock));
    let mut supervisor = SessionSupervisor::new(observer);
    supervisor.bind_device(link.clone());
    (supervisor, link, events)
}

async fn collect(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let finished = event.is_finished();
        seen.push(event);
        if finished {
            break;
        }
    }
    seen
}

fn tick_times(events: &[SessionEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Tick { elapsed_secs, .. } => Some(*elapsed_secs),
            _ => None,
        })
        .collect()
}

async fn assert_restored(link: &Arc<Mutex<MockCharger>>) {
    let link = link.lock().await;
    assert_eq!(link.cutoff_current(), OLD_CUTOFF);
    assert_eq!(link.max_current(), OLD_MAX);
    assert!(link.is_idle(), "pack should be left idle");
}

#[tokio::test(start_paused = true)]
async fn test_happy_path() {
    let (mut supervisor, link, mut events) = setup(MockCharger::new(OLD_CUTOFF, OLD_MAX));

    supervisor.start(2.0, "4800", ProfileSelection::Gentle).unwrap();
    let events = collect(&mut events).await;

    assert!(matches!(events[0], SessionEvent::Started { .. }));
    assert!(matches!(events[1], SessionEvent::Negotiating { .. }));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Finished {
            outcome: SessionOutcome::Completed,
            ..
        })
    ));

    let ticks = tick_times(&events);
    assert!(ticks.len() >= 3, "expected at least 3 ticks, got {ticks:?}");
    assert!((ticks[0] - 0.6).abs() < 0.05, "first tick {ticks:?}");
    for pair in ticks.windows(2) {
        assert!(((pair[1] - pair[0]) - 0.5).abs() < 0.05, "spacing {pair:?}");
    }
    assert!(events[2..events.len() - 1]
        .iter()
        .all(|event| matches!(event, SessionEvent::Tick { .. })));

    if let SessionEvent::Started { params, .. } = &events[0] {
        assert_eq!(params.profile.cutoff_raw, 150);
        assert_eq!(params.profile.max_raw, 2500);
        assert_eq!(params.interval, Duration::from_millis(500));
    }

    let report = supervisor.join().await.unwrap();
    assert_eq!(report.ticks as usize, ticks.len());
    assert!(report.restored);
    assert_restored(&link).await;

    let link = link.lock().await;
    assert!(link.calls().starts_with(&[MockCall::SetCutoff(150), MockCall::SetMax(2500)]));
}

#[tokio::test(start_paused = true)]
async fn test_negotiation_failure() {
    let (mut supervisor, link, mut events) =
        setup(MockCharger::new(OLD_CUTOFF, OLD_MAX).failing_reset());

    supervisor.start(10.0, "4800", ProfileSelection::Normal).unwrap();
    let events = collect(&mut events).await;

    assert_eq!(events.len(), 4, "{events:?}");
    assert!(matches!(events[0], SessionEvent::Started { .. }));
    assert!(matches!(events[1], SessionEvent::Negotiating { .. }));
    match &events[2] {
        SessionEvent::NegotiationFailed { reason, .. } => {
            assert!(reason.starts_with("reset() failed"), "{reason}");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        events[3],
        SessionEvent::Finished {
            outcome: SessionOutcome::NegotiationFailed,
            ..
        }
    ));
    assert!(tick_times(&events).is_empty());

    assert_restored(&link).await;
    let link = link.lock().await;
    assert!(!link.calls().contains(&MockCall::Configure(2)));
}

#[tokio::test(start_paused = true)]
async fn test_configure_failure_aborts_negotiation() {
    let (mut supervisor, link, mut events) =
        setup(MockCharger::new(OLD_CUTOFF, OLD_MAX).failing_configure(1));

    supervisor.start(10.0, "1200", ProfileSelection::Aggressive).unwrap();
    let events = collect(&mut events).await;

    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::NegotiationFailed { reason, .. } if reason.starts_with("configure(1)")
    )));
    assert!(tick_times(&events).is_empty());
    assert_restored(&link).await;
}

#[tokio::test(start_paused = true)]
async fn test_mid_run_cancellation() {
    let (mut supervisor, link, mut events) = setup(MockCharger::new(OLD_CUTOFF, OLD_MAX));

    supervisor.start(60.0, "4800", ProfileSelection::Normal).unwrap();

    let mut ticks = 0;
    let mut stopped_at = None;
    let mut finished_at = None;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Tick { .. } => {
                ticks += 1;
                if ticks == 2 {
                    supervisor.stop();
                    stopped_at = Some(Instant::now());
                }
            }
            SessionEvent::Finished { outcome, .. } => {
                assert_eq!(outcome, SessionOutcome::Cancelled);
                finished_at = Some(Instant::now());
                break;
            }
            _ => {}
        }
    }

    assert_eq!(ticks, 2);
    let latency = finished_at.unwrap() - stopped_at.unwrap();
    assert!(latency <= Duration::from_millis(505), "{latency:?}");

    let report = supervisor.join().await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.ticks, 2);
    assert_restored(&link).await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_negotiation_completes_handshake() {
    let (mut supervisor, link, mut events) = setup(MockCharger::new(OLD_CUTOFF, OLD_MAX));

    supervisor.start(60.0, "4800", ProfileSelection::Normal).unwrap();

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let negotiating = matches!(event, SessionEvent::Negotiating { .. });
        let finished = event.is_finished();
        seen.push(event);
        if negotiating {
            // the worker is now inside the settle delay
            supervisor.stop();
        }
        if finished {
            break;
        }
    }

    assert!(tick_times(&seen).is_empty(), "{seen:?}");
    assert!(!seen
        .iter()
        .any(|event| matches!(event, SessionEvent::NegotiationFailed { .. })));
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Finished {
            outcome: SessionOutcome::Cancelled,
            ..
        })
    ));

    let report = supervisor.join().await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.ticks, 0);
    assert!(report.elapsed >= Duration::from_millis(600));
    assert_restored(&link).await;

    let link = link.lock().await;
    let calls = link.calls();
    assert!(calls.contains(&MockCall::Keepalive));
    assert!(calls.contains(&MockCall::Configure(1)));
    let snapshots = calls
        .iter()
        .filter(|call| **call == MockCall::GetSnapshot)
        .count();
    assert_eq!(snapshots, 2);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_failure() {
    // one keepalive during negotiation, two good ticks, then failure
    let (mut supervisor, link, mut events) =
        setup(MockCharger::new(OLD_CUTOFF, OLD_MAX).failing_keepalive_after(3));

    supervisor.start(60.0, "9600", ProfileSelection::Normal).unwrap();
    let events = collect(&mut events).await;

    assert_eq!(tick_times(&events).len(), 2);
    let failures = events
        .iter()
        .filter(|event| matches!(event, SessionEvent::KeepaliveFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Finished {
            outcome: SessionOutcome::KeepaliveFailed,
            ..
        })
    ));
    assert_restored(&link).await;
}

#[tokio::test(start_paused = true)]
async fn test_restoration_invariant_across_failures_and_profiles() {
    let failures: Vec<fn(MockCharger) -> MockCharger> = vec![
        |mock| mock,
        MockCharger::failing_reset,
        MockCharger::failing_snapshot,
        |mock| mock.failing_keepalive_after(2),
        MockCharger::failing_idle,
    ];

    for arm in failures {
        for selection in ProfileSelection::ALL {
            let (mut supervisor, link, mut events) =
                setup(arm(MockCharger::new(OLD_CUTOFF, OLD_MAX)));
            supervisor.catalog_mut().custom_mut().cutoff_raw = "500".to_string();
            supervisor.catalog_mut().custom_mut().max_raw = "7000".to_string();

            supervisor.start(1.5, "9600", selection).unwrap();
            collect(&mut events).await;
            let report = supervisor.join().await.unwrap();
            assert!(report.restored);

            let link = link.lock().await;
            assert_eq!(link.cutoff_current(), OLD_CUTOFF, "{selection}");
            assert_eq!(link.max_current(), OLD_MAX, "{selection}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_active_session() {
    let (mut supervisor, link, mut events) = setup(MockCharger::new(OLD_CUTOFF, OLD_MAX));

    let first = supervisor.start(2.0, "4800", ProfileSelection::Normal).unwrap();
    assert!(matches!(
        supervisor.start(2.0, "4800", ProfileSelection::Gentle),
        Err(SimError::AlreadyRunning)
    ));
    assert!(matches!(
        supervisor.start_from_text("2", "9600", "Custom"),
        Err(SimError::AlreadyRunning)
    ));
    assert_eq!(supervisor.active_session(), Some(first));

    let events = collect(&mut events).await;
    assert!(events.iter().all(|event| event.session_id() == first));

    supervisor.join().await.unwrap();
    let link = link.lock().await;
    let resets = link
        .calls()
        .iter()
        .filter(|call| **call == MockCall::Reset)
        .count();
    assert_eq!(resets, 1);
    assert!(link.calls().contains(&MockCall::SetMax(6000)));
    assert!(!link.calls().contains(&MockCall::SetMax(2500)));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_stop_matches_single_stop() {
    let (mut supervisor, link, mut events) = setup(MockCharger::new(OLD_CUTOFF, OLD_MAX));

    // stop before any session has no effect on the next one
    supervisor.stop();
    supervisor.stop();

    supervisor.start(60.0, "4800", ProfileSelection::Normal).unwrap();

    let mut ticks = 0;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Tick { .. } => {
                ticks += 1;
                if ticks == 2 {
                    for _ in 0..5 {
                        supervisor.stop();
                    }
                }
            }
            SessionEvent::Finished { outcome, .. } => {
                assert_eq!(outcome, SessionOutcome::Cancelled);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(ticks, 2);

    supervisor.join().await.unwrap();
    supervisor.stop();
    assert!(!supervisor.is_running());
    assert_restored(&link).await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_profile_is_installed() {
    let (mut supervisor, link, mut events) = setup(MockCharger::new(OLD_CUTOFF, OLD_MAX));
    supervisor.catalog_mut().custom_mut().cutoff_raw = "500".to_string();
    supervisor.catalog_mut().custom_mut().max_raw = "7000".to_string();

    supervisor.start_from_text("1", "2400", "Custom").unwrap();
    let events = collect(&mut events).await;

    if let SessionEvent::Started { params, .. } = &events[0] {
        assert_eq!(params.profile.cutoff_raw, 500);
        assert_eq!(params.profile.max_raw, 7000);
        assert_eq!(params.interval, Duration::from_millis(750));
    } else {
        panic!("first event should be Started, got {:?}", events[0]);
    }

    // editing the custom fields after start does not touch the running session
    supervisor.catalog_mut().custom_mut().max_raw = "0".to_string();
    supervisor.join().await.unwrap();

    let link = link.lock().await;
    assert!(link.calls().starts_with(&[MockCall::SetCutoff(500), MockCall::SetMax(7000)]));
    assert_eq!(link.cutoff_current(), OLD_CUTOFF);
}

#[tokio::test(start_paused = true)]
async fn test_restoration_failure_is_reported() {
    let (mut supervisor, link, mut events) =
        setup(MockCharger::new(OLD_CUTOFF, OLD_MAX).rejecting_value(OLD_CUTOFF));

    supervisor.start(1.0, "4800", ProfileSelection::Aggressive).unwrap();
    let events = collect(&mut events).await;

    let n = events.len();
    assert!(matches!(events[n - 2], SessionEvent::RestorationFailed { .. }));
    assert!(events[n - 1].is_finished());

    let report = supervisor.join().await.unwrap();
    assert!(!report.restored);

    // the max field is still written back
    let link = link.lock().await;
    assert_eq!(link.max_current(), OLD_MAX);
    assert_eq!(link.cutoff_current(), 450);
}
