use super::*;
use crate::config::HeuristicConfig;
use crate::engine::clock::{ManualTimeSource, SystemTimeSource};
use crate::signal::{SyntheticConfig, SyntheticSource};
use crate::telemetry::MetricEvent;
use std::collections::VecDeque;

fn engine_for(extractor: &FeatureExtractor) -> ClassificationEngine {
    let names = extractor.feature_names();
    ClassificationEngine::new(HeuristicConfig::default(), &names, None).unwrap()
}

fn driver<L: SampleLink>(link: L, config: &PipelineConfig, clock: Arc<dyn TimeSource>) -> PipelineDriver<L> {
    let extractor = FeatureExtractor::new(config.sampling.sample_rate_hz, &config.features).unwrap();
    let engine = engine_for(&extractor);
    PipelineDriver::new(link, config, extractor, engine, clock)
}

fn tremor(frequency_hz: f64, limit: Option<u64>) -> SyntheticSource {
    SyntheticSource::new(SyntheticConfig {
        frequency_hz,
        limit,
        ..SyntheticConfig::default()
    })
}

/// Link replaying a fixed list of samples and a scripted drop counter
struct ScriptedLink {
    values: VecDeque<f64>,
    dropped: u64,
}

impl SampleLink for ScriptedLink {
    fn read_sample(&mut self) -> Option<Sample> {
        self.values.pop_front().map(|v| Sample::now(2048.0 + v, v))
    }

    fn stats(&self) -> LinkStats {
        LinkStats {
            dropped: self.dropped,
            ..LinkStats::default()
        }
    }

    fn is_exhausted(&self) -> bool {
        self.values.is_empty()
    }
}

#[test]
fn test_buffers_until_window_then_classifies_immediately() {
    let config = PipelineConfig::default();
    let clock = ManualTimeSource::new();
    let mut driver = driver(tremor(5.0, None), &config, Arc::new(clock.clone()));

    for _ in 0..499 {
        assert!(driver.poll_once());
    }
    assert_eq!(
        driver.tick(clock.now()),
        TickOutcome::Buffering {
            buffered: 499,
            required: 500
        }
    );

    assert!(driver.poll_once());
    match driver.tick(clock.now()) {
        TickOutcome::Classified(result) => {
            assert_eq!(result.label, Severity::Severe);
            assert_eq!(result.confidence, 0.70);
            assert_eq!(result.tier, DecisionTier::Heuristic);
            assert!((result.dominant_frequency - 5.0).abs() <= 0.78125);
            assert!(result.amplitude > 30.0);
            assert_eq!(result.features.len(), 8);
        }
        other => panic!("expected a classification, got {:?}", other),
    }
}

#[test]
fn test_classify_interval_gates_ticks() {
    let config = PipelineConfig::default();
    let clock = ManualTimeSource::new();
    let mut driver = driver(tremor(0.5, None), &config, Arc::new(clock.clone()));
    for _ in 0..600 {
        driver.poll_once();
    }

    assert!(matches!(driver.tick(clock.now()), TickOutcome::Classified(_)));
    clock.advance(Duration::from_millis(999));
    assert_eq!(driver.tick(clock.now()), TickOutcome::NotDue);
    clock.advance(Duration::from_millis(1));
    assert!(matches!(driver.tick(clock.now()), TickOutcome::Classified(_)));
    assert_eq!(driver.stats().classifications, 2);
}

#[test]
fn test_results_are_stamped_from_the_clock() {
    let config = PipelineConfig::default();
    let clock = ManualTimeSource::starting_at_ms(1_700_000_000_000);
    let mut driver = driver(tremor(5.0, None), &config, Arc::new(clock.clone()));
    for _ in 0..500 {
        driver.poll_once();
    }

    clock.advance(Duration::from_millis(1250));
    match driver.tick(clock.now()) {
        TickOutcome::Classified(result) => assert_eq!(result.produced_at_ms, 1_700_000_001_250),
        other => panic!("expected a classification, got {:?}", other),
    }
}

#[test]
fn test_ring_keeps_only_capacity() {
    let config = PipelineConfig::default();
    let mut driver = driver(tremor(5.0, None), &config, Arc::new(SystemTimeSource));
    for _ in 0..1500 {
        driver.poll_once();
    }
    assert_eq!(driver.buffered(), 1000);
    assert_eq!(driver.stats().samples_ingested, 1500);
}

#[test]
fn test_results_reach_subscribers() {
    let config = PipelineConfig::default();
    let clock = ManualTimeSource::new();
    let mut driver = driver(tremor(2.0, None), &config, Arc::new(clock.clone()));
    let mut rx = driver.subscribe();

    for _ in 0..500 {
        driver.poll_once();
    }
    driver.tick(clock.now());

    let result = rx.try_recv().unwrap();
    assert_eq!(result.label, Severity::Mild);
    assert_eq!(result.confidence, 0.80);
}

#[test]
fn test_silence_classifies_normal_with_zero_features() {
    let config = PipelineConfig::default();
    let link = ScriptedLink {
        values: std::iter::repeat(0.0).take(500).collect(),
        dropped: 0,
    };
    let clock = ManualTimeSource::new();
    let mut driver = driver(link, &config, Arc::new(clock.clone()));
    while driver.poll_once() {}

    let TickOutcome::Classified(result) = driver.tick(clock.now()) else {
        panic!("silence should still classify");
    };
    assert_eq!(result.label, Severity::Normal);
    assert_eq!(result.confidence, 0.95);
    assert!(result.features.values().iter().all(|v| *v == 0.0));
}

#[test]
fn test_window_below_extractor_minimum_is_not_ready() {
    let mut config = PipelineConfig::default();
    config.sampling.window_size = 50;
    config.features.min_window_samples = 100;
    let clock = ManualTimeSource::new();
    let mut driver = driver(tremor(5.0, None), &config, Arc::new(clock.clone()));
    for _ in 0..60 {
        driver.poll_once();
    }
    assert_eq!(
        driver.tick(clock.now()),
        TickOutcome::NotReady {
            available: 50,
            required: 100
        }
    );
    assert_eq!(driver.stats().classifications, 0);
}

#[test]
fn test_skipped_ticks_reported_once_per_interval() {
    let config = PipelineConfig::default();
    let clock = ManualTimeSource::new();
    let telemetry = Arc::new(TelemetryHub::default());
    let mut driver = driver(tremor(5.0, None), &config, Arc::new(clock.clone()))
        .with_telemetry(Arc::clone(&telemetry));

    for _ in 0..10 {
        driver.poll_once();
        driver.tick(clock.now());
    }
    clock.advance(Duration::from_secs(1));
    driver.tick(clock.now());

    let skipped = telemetry
        .snapshot()
        .recent
        .iter()
        .filter(|e| matches!(e, MetricEvent::TickSkipped { .. }))
        .count();
    assert_eq!(skipped, 2);
    assert_eq!(driver.stats().skipped_ticks, 2);
}

#[test]
fn test_run_exits_when_source_exhausted() {
    let mut config = PipelineConfig::default();
    config.sampling.classify_interval_ms = 0;
    config.sampling.poll_interval_ms = 1;
    let driver = driver(tremor(5.0, Some(700)), &config, Arc::new(SystemTimeSource));
    let mut rx = driver.subscribe();

    let stats = spawn_pipeline_thread(driver).join().unwrap();
    assert_eq!(stats.samples_ingested, 700);
    assert_eq!(stats.link.samples, 700);
    // at least one classification per sample once the window is full
    assert!(stats.classifications >= 201);

    let mut last = None;
    loop {
        match rx.try_recv() {
            Ok(result) => last = Some(result),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(last.unwrap().label, Severity::Severe);
}

#[test]
fn test_run_honours_stop_flag() {
    let config = PipelineConfig::default();
    let driver = driver(tremor(5.0, None), &config, Arc::new(SystemTimeSource));
    let stop = driver.stop_flag();
    let handle = spawn_pipeline_thread(driver);

    thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished());
    stop.stop();
    let stats = handle.join().unwrap();
    assert!(stats.samples_ingested > 0);
}

#[test]
fn test_run_honours_max_duration() {
    let mut config = PipelineConfig::default();
    config.sampling.max_run_seconds = Some(0.1);
    let driver = driver(
        SyntheticSource::new(SyntheticConfig {
            paced: true,
            ..SyntheticConfig::default()
        }),
        &config,
        Arc::new(SystemTimeSource),
    );
    let started = Instant::now();
    let stats = spawn_pipeline_thread(driver).join().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(stats.samples_ingested > 0);
}

#[test]
fn test_link_drops_reach_telemetry() {
    let config = PipelineConfig::default();
    let telemetry = Arc::new(TelemetryHub::default());
    let link = ScriptedLink {
        values: VecDeque::from(vec![1.0, -1.0]),
        dropped: 7,
    };
    let clock = ManualTimeSource::new();
    let mut driver =
        driver(link, &config, Arc::new(clock.clone())).with_telemetry(Arc::clone(&telemetry));
    driver.poll_once();
    driver.tick(clock.now());

    assert!(telemetry
        .snapshot()
        .recent
        .contains(&MetricEvent::SamplesDropped { count: 7 }));
}
