use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use tremor_monitor::analysis::{ClassificationResult, DecisionTier, FeatureVector, Severity};
use tremor_monitor::config::DispatchConfig;
use tremor_monitor::dispatch::{
    spawn_dispatch_worker, ConnectionHealth, DispatchFailure, DispatchOutcome, Dispatcher,
    HealthPolicy, HealthTracker, HttpSink,
};
use tremor_monitor::engine::{ManualTimeSource, SystemTimeSource, TimeSource};
use tremor_monitor::telemetry::{MetricEvent, TelemetryHub};

/// Local stand-in for the result API
struct StubSink {
    statuses: Mutex<VecDeque<u16>>,
    bodies: Mutex<Vec<Value>>,
    delay: Duration,
}

async fn accept_tremor(State(stub): State<Arc<StubSink>>, Json(body): Json<Value>) -> StatusCode {
    stub.bodies.lock().unwrap().push(body);
    tokio::time::sleep(stub.delay).await;
    let code = stub.statuses.lock().unwrap().pop_front().unwrap_or(200);
    StatusCode::from_u16(code).unwrap()
}

async fn start_stub(statuses: Vec<u16>, delay: Duration) -> (String, Arc<StubSink>) {
    let stub = Arc::new(StubSink {
        statuses: Mutex::new(statuses.into()),
        bodies: Mutex::new(Vec::new()),
        delay,
    });
    let app = Router::new()
        .route("/api/tremor", post(accept_tremor))
        .with_state(Arc::clone(&stub));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), stub)
}

fn result(label: Severity, produced_at_ms: u64) -> ClassificationResult {
    ClassificationResult {
        label,
        confidence: 0.7,
        tier: DecisionTier::Heuristic,
        low_confidence: false,
        dominant_frequency: 5.46875,
        amplitude: 36.2,
        produced_at_ms,
        probabilities: None,
        features: FeatureVector::default(),
    }
}

fn dispatcher(base_url: &str, timeout_ms: u64) -> Dispatcher {
    let config = DispatchConfig {
        timeout_ms,
        ..DispatchConfig::default()
    };
    let sink = HttpSink::new(base_url, config.timeout()).unwrap();
    Dispatcher::new(Arc::new(sink), "ESP32_CLASSIFIER", &config)
}

#[tokio::test]
async fn five_server_errors_lose_connection_then_one_success_recovers() {
    let (base_url, _stub) = start_stub(vec![500, 500, 500, 500, 500, 200], Duration::ZERO).await;
    let dispatcher = dispatcher(&base_url, 1000);
    let mut health = HealthTracker::new(HealthPolicy::default(), Instant::now());

    for attempt in 1..=5 {
        let outcome = dispatcher.dispatch(&result(Severity::Severe, attempt)).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Fail(DispatchFailure::Status { code: 500 })
        );
        health.record_failure(Instant::now());
    }
    assert_eq!(health.state(), ConnectionHealth::Lost);
    assert_eq!(health.consecutive_failures(), 5);

    let outcome = dispatcher.dispatch(&result(Severity::Severe, 6)).await;
    assert_eq!(outcome, DispatchOutcome::Ack { status: 200 });
    health.record_ack(Instant::now());
    assert_eq!(health.state(), ConnectionHealth::Connected);
    assert_eq!(health.consecutive_failures(), 0);
}

#[tokio::test]
async fn payload_matches_result_api_shape() {
    let (base_url, stub) = start_stub(vec![201], Duration::ZERO).await;
    let dispatcher = dispatcher(&base_url, 1000);

    let outcome = dispatcher
        .dispatch(&result(Severity::Mild, 1_700_000_000_000))
        .await;
    assert!(outcome.is_ack());

    let bodies = stub.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["deviceId"], "ESP32_CLASSIFIER");
    assert_eq!(body["classification"], "mild");
    assert_eq!(body["confidence"], 0.7);
    assert_eq!(body["frequency"], 5.46875);
    assert_eq!(body["amplitude"], 36.2);
    assert_eq!(body["timestamp"], 1_700_000_000_000u64);
    assert_eq!(body["dataType"], "realtime_classification");
    assert_eq!(body.as_object().unwrap().len(), 7);
}

#[tokio::test]
async fn slow_sink_is_a_timeout_failure() {
    let (base_url, _stub) = start_stub(vec![200], Duration::from_millis(1500)).await;
    let dispatcher = dispatcher(&base_url, 200);

    let started = Instant::now();
    let outcome = dispatcher.dispatch(&result(Severity::Normal, 1)).await;
    assert_eq!(outcome, DispatchOutcome::Fail(DispatchFailure::Timeout));
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn unreachable_sink_is_a_transport_failure() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let dispatcher = dispatcher(&format!("http://127.0.0.1:{port}"), 1000);

    let outcome = dispatcher.dispatch(&result(Severity::Normal, 1)).await;
    assert!(matches!(
        outcome,
        DispatchOutcome::Fail(DispatchFailure::Transport { .. })
    ));
}

#[tokio::test]
async fn worker_publishes_health_transitions() {
    let (base_url, _stub) = start_stub(vec![500, 500, 500, 500, 500, 200], Duration::ZERO).await;
    let telemetry = Arc::new(TelemetryHub::default());
    let (submitter, handle) = spawn_dispatch_worker(
        dispatcher(&base_url, 1000),
        HealthPolicy::default(),
        Arc::new(SystemTimeSource),
        Arc::clone(&telemetry),
        &tokio::runtime::Handle::current(),
    );
    let mut health = handle.subscribe_health();

    let mut seen = Vec::new();
    for at in 0..6 {
        submitter.submit(result(Severity::Severe, at));
        // let each attempt finish before the next result supersedes it
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let attempts = telemetry
                .snapshot()
                .recent
                .iter()
                .filter(|e| matches!(e, MetricEvent::Dispatch { .. }))
                .count();
            if attempts > at as usize || Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if health.has_changed().unwrap() {
            seen.push(*health.borrow_and_update());
        }
    }

    assert_eq!(seen, vec![ConnectionHealth::Lost, ConnectionHealth::Connected]);
    drop(submitter);
    let stats = handle.join().await.unwrap();
    assert_eq!(stats.attempts, 6);
    assert_eq!(stats.superseded, 0);
}

#[tokio::test]
async fn degraded_requires_silence_past_threshold() {
    let (base_url, _stub) = start_stub(vec![503; 4], Duration::ZERO).await;
    let dispatcher = dispatcher(&base_url, 1000);
    let clock = ManualTimeSource::new();
    let mut health = HealthTracker::new(HealthPolicy::default(), clock.now());

    for at in 0..3 {
        assert!(!dispatcher.dispatch(&result(Severity::Mild, at)).await.is_ack());
        health.record_failure(clock.now());
    }
    assert_eq!(health.state(), ConnectionHealth::Connected);

    clock.advance(Duration::from_millis(3100));
    assert!(!dispatcher.dispatch(&result(Severity::Mild, 3)).await.is_ack());
    health.record_failure(clock.now());
    assert_eq!(health.state(), ConnectionHealth::Degraded);
}
