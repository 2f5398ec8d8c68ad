use super::*;
use crate::analysis::Severity;
use crate::dispatch::SinkPayload;
use crate::error::SinkError;
use crate::signal::{SyntheticConfig, SyntheticSource};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Mutex;

/// Sink that accepts everything and remembers what it saw
#[derive(Default)]
struct RecordingSink {
    payloads: Mutex<Vec<SinkPayload>>,
}

impl ResultSink for RecordingSink {
    fn send(&self, payload: SinkPayload) -> BoxFuture<'static, Result<u16, SinkError>> {
        self.payloads.lock().unwrap().push(payload);
        async { Ok(200) }.boxed()
    }
}

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.sampling.classify_interval_ms = 50;
    config.sampling.poll_interval_ms = 1;
    config
}

fn limited(frequency_hz: f64, limit: u64) -> SyntheticSource {
    SyntheticSource::new(SyntheticConfig {
        frequency_hz,
        limit: Some(limit),
        ..SyntheticConfig::default()
    })
}

#[test]
fn test_builder_rejects_window_larger_than_buffer() {
    let mut config = PipelineConfig::default();
    config.sampling.window_size = 2000;
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let result = PipelineBuilder::new(config).spawn(limited(5.0, 10), runtime.handle());
    assert!(matches!(result, Err(ConfigError::InvalidWindow { window: 2000, capacity: 1000, .. })));
}

#[test]
fn test_builder_rejects_bad_sink_url() {
    let mut config = PipelineConfig::default();
    config.dispatch.sink_url = Some("not a url".to_string());
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let result = PipelineBuilder::new(config).spawn(limited(5.0, 10), runtime.handle());
    assert!(matches!(result, Err(ConfigError::InvalidDispatch { .. })));
}

#[test]
fn test_build_stages_uses_configured_features() {
    let mut config = PipelineConfig::default();
    config.features.names = vec!["rms".to_string(), "dominant_frequency".to_string()];
    let mut builder = PipelineBuilder::new(config);
    let (extractor, engine) = builder.build_stages().unwrap();
    assert_eq!(extractor.feature_names(), vec!["rms", "dominant_frequency"]);
    assert!(!engine.has_classifier());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_runs_to_exhaustion_and_dispatches() {
    let sink = Arc::new(RecordingSink::default());
    let handle = PipelineBuilder::new(fast_config())
        .sink(sink.clone())
        .spawn(limited(5.0, 800), &tokio::runtime::Handle::current())
        .unwrap();
    assert!(handle.has_dispatch());

    let report = handle.join().await;
    let driver = report.driver.unwrap();
    assert_eq!(driver.samples_ingested, 800);
    assert!(driver.classifications >= 1);
    assert_eq!(report.health, ConnectionHealth::Connected);

    let dispatch = report.dispatch.unwrap();
    assert!(dispatch.acks >= 1);
    assert_eq!(dispatch.attempts, dispatch.acks + dispatch.failures);

    assert!(report.telemetry.recent.iter().any(|e| matches!(
        e,
        crate::telemetry::MetricEvent::Classification {
            label: Severity::Severe,
            ..
        }
    )));

    let payloads = sink.payloads.lock().unwrap();
    assert!(!payloads.is_empty());
    assert!(payloads.iter().all(|p| p.classification == "severe"));
    assert!(payloads.iter().all(|p| p.device_id == "ESP32_CLASSIFIER"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_flag_ends_unbounded_source() {
    let source = SyntheticSource::new(SyntheticConfig {
        paced: true,
        ..SyntheticConfig::default()
    });
    let handle = PipelineBuilder::new(fast_config())
        .spawn(source, &tokio::runtime::Handle::current())
        .unwrap();
    assert!(!handle.has_dispatch());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.is_running());
    handle.stop();

    let report = handle.join().await;
    assert!(report.driver.unwrap().samples_ingested > 0);
    assert!(report.dispatch.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_threaded_reader_reports_link_stats() {
    let handle = PipelineBuilder::new(fast_config())
        .spawn_threaded(limited(2.0, 600), &tokio::runtime::Handle::current())
        .unwrap();

    let report = handle.join().await;
    assert_eq!(report.driver.unwrap().samples_ingested, 600);
    assert_eq!(report.reader.unwrap().samples, 600);
    assert!(report
        .telemetry
        .recent
        .iter()
        .any(|e| matches!(e, crate::telemetry::MetricEvent::Classification { .. })));
}
