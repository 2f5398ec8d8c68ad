// Analysis module - windowed feature extraction and tremor classification
//
// Architecture:
// - PipelineDriver: single loop that owns the ring buffer
// - Ingestion: one sample per poll, at whatever rate the link delivers
// - Tick: every classify interval, snapshot the newest window, extract
//   features, classify, then publish to subscribers and the dispatch slot
//
// Ingestion never waits on classification or dispatch. Dispatch runs on its
// own task and only ever sees the latest result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::config::PipelineConfig;
use crate::dispatch::DispatchSubmitter;
use crate::engine::clock::TimeSource;
use crate::signal::{LinkStats, RingBuffer, Sample, SampleLink};
use crate::telemetry::{SkipReason, TelemetryHub};

pub mod classifier;
pub mod features;
pub mod model;

pub use classifier::{ClassificationEngine, Decision, DecisionTier, HeuristicTier, Severity};
pub use features::{Extracted, Extraction, FeatureExtractor, FeatureKind, FeatureSet, FeatureVector};
pub use model::{ModelSpec, Prediction, Predictor, TrainedModel};

/// Capacity of the result broadcast channel
pub const RESULT_CHANNEL_CAPACITY: usize = 64;

/// One classified window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: Severity,
    /// 0.0-1.0
    pub confidence: f64,
    pub tier: DecisionTier,
    pub low_confidence: bool,
    /// Hz
    pub dominant_frequency: f64,
    /// RMS of the window
    pub amplitude: f64,
    /// Epoch milliseconds
    pub produced_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f64>>,
    pub features: FeatureVector,
}

impl ClassificationResult {
    pub fn from_decision(decision: Decision, extracted: Extracted, produced_at_ms: u64) -> Self {
        Self {
            label: decision.label,
            confidence: decision.confidence,
            tier: decision.tier,
            low_confidence: decision.low_confidence,
            dominant_frequency: extracted.set.dominant_frequency,
            amplitude: extracted.set.rms,
            produced_at_ms,
            probabilities: decision.probabilities,
            features: extracted.vector,
        }
    }
}

/// Cooperative stop signal shared with the driver loop
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one call to `PipelineDriver::tick` did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Classify interval has not elapsed
    NotDue,
    /// Fewer than `window_size` samples buffered
    Buffering { buffered: usize, required: usize },
    /// Extractor refused the window
    NotReady { available: usize, required: usize },
    Classified(ClassificationResult),
}

/// Counters reported when the driver exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub samples_ingested: u64,
    pub classifications: u64,
    /// Skipped ticks, at most one counted per classify interval
    pub skipped_ticks: u64,
    pub dispatch_submissions: u64,
    pub link: LinkStats,
}

/// Single-threaded ingest and classify loop
pub struct PipelineDriver<L: SampleLink> {
    link: L,
    ring: RingBuffer,
    extractor: FeatureExtractor,
    engine: ClassificationEngine,
    clock: Arc<dyn TimeSource>,
    results: broadcast::Sender<ClassificationResult>,
    dispatch: Option<DispatchSubmitter>,
    telemetry: Arc<TelemetryHub>,
    stop: StopFlag,

    window_size: usize,
    classify_interval: Duration,
    poll_interval: Duration,
    max_run: Option<Duration>,

    last_tick: Option<Instant>,
    last_skip_report: Option<Instant>,
    reported_dropped: u64,
    stats: DriverStats,
}

impl<L: SampleLink> PipelineDriver<L> {
    /// Build a driver around an open link
    ///
    /// `config` is expected to be validated; the ring buffer asserts a
    /// non-zero capacity.
    pub fn new(
        link: L,
        config: &PipelineConfig,
        extractor: FeatureExtractor,
        engine: ClassificationEngine,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let sampling = &config.sampling;
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            link,
            ring: RingBuffer::new(sampling.capacity()),
            extractor,
            engine,
            clock,
            results,
            dispatch: None,
            telemetry: Arc::new(TelemetryHub::default()),
            stop: StopFlag::new(),
            window_size: sampling.window_size,
            classify_interval: sampling.classify_interval(),
            poll_interval: sampling.poll_interval(),
            max_run: sampling.max_run(),
            last_tick: None,
            last_skip_report: None,
            reported_dropped: 0,
            stats: DriverStats::default(),
        }
    }

    pub fn with_results(mut self, results: broadcast::Sender<ClassificationResult>) -> Self {
        self.results = results;
        self
    }

    pub fn with_dispatch(mut self, submitter: DispatchSubmitter) -> Self {
        self.dispatch = Some(submitter);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryHub>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClassificationResult> {
        self.results.subscribe()
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            link: self.link.stats(),
            ..self.stats
        }
    }

    pub fn engine_mut(&mut self) -> &mut ClassificationEngine {
        &mut self.engine
    }

    /// Push one sample's filtered value into the ring buffer
    pub fn ingest(&mut self, sample: &Sample) {
        self.ring.push(sample.filtered);
        self.stats.samples_ingested += 1;
        self.telemetry
            .record_buffer_occupancy("ring_buffer", self.ring.occupancy());
    }

    /// Read at most one sample from the link
    ///
    /// # Returns
    /// true if a sample was ingested
    pub fn poll_once(&mut self) -> bool {
        match self.link.read_sample() {
            Some(sample) => {
                self.ingest(&sample);
                true
            }
            None => false,
        }
    }

    /// Classify the newest window if the interval has elapsed
    ///
    /// A tick that finds too few samples does not consume the interval, so
    /// the first classification happens as soon as the window fills.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if let Some(last) = self.last_tick {
            if now.saturating_duration_since(last) < self.classify_interval {
                return TickOutcome::NotDue;
            }
        }
        self.report_link_drops();

        let buffered = self.ring.len();
        if buffered < self.window_size {
            let reason = SkipReason::Buffering {
                buffered,
                required: self.window_size,
            };
            self.skip(reason, now);
            return TickOutcome::Buffering {
                buffered,
                required: self.window_size,
            };
        }
        self.last_tick = Some(now);

        let window = self.ring.snapshot(self.window_size);
        let extracted = match self.extractor.extract(&window) {
            Extraction::Ready(extracted) => extracted,
            Extraction::NotReady {
                available,
                required,
            } => {
                self.skip(
                    SkipReason::InsufficientData {
                        available,
                        required,
                    },
                    now,
                );
                return TickOutcome::NotReady {
                    available,
                    required,
                };
            }
        };

        let decision = self.engine.classify(&extracted);
        let result = ClassificationResult::from_decision(decision, extracted, self.clock.timestamp_ms());
        self.publish(&result);
        TickOutcome::Classified(result)
    }

    /// Run until stopped, the maximum run time passes, or the link is exhausted
    pub fn run(mut self) -> DriverStats {
        let started = self.clock.now();
        tracing::info!(
            "[Pipeline] Starting loop (window {} samples, classify every {:?}, capacity {})",
            self.window_size,
            self.classify_interval,
            self.ring.capacity()
        );

        loop {
            if self.stop.is_stopped() {
                tracing::info!("[Pipeline] Stop requested, exiting");
                break;
            }
            if let Some(max_run) = self.max_run {
                if self.clock.now().saturating_duration_since(started) >= max_run {
                    tracing::info!("[Pipeline] Maximum run time {:?} reached, exiting", max_run);
                    break;
                }
            }

            let ingested = self.poll_once();
            let now = self.clock.now();
            self.tick(now);

            if !ingested {
                if self.link.is_exhausted() {
                    tracing::info!("[Pipeline] Source exhausted, exiting");
                    break;
                }
                thread::sleep(self.poll_interval);
            }
        }

        self.report_link_drops();
        let stats = self.stats();
        tracing::info!(
            "[Pipeline] Loop finished: {} samples, {} classifications, {} skipped ticks",
            stats.samples_ingested,
            stats.classifications,
            stats.skipped_ticks
        );
        stats
    }

    fn publish(&mut self, result: &ClassificationResult) {
        self.stats.classifications += 1;
        self.telemetry.record_classification(result);
        tracing::debug!(
            "[Pipeline] {} ({:.2}, {:?}) at {:.2} Hz",
            result.label,
            result.confidence,
            result.tier,
            result.dominant_frequency
        );

        if let Some(submitter) = &self.dispatch {
            if submitter.submit(result.clone()) {
                self.stats.dispatch_submissions += 1;
            } else {
                tracing::warn!("[Pipeline] Dispatch worker is gone, results will not be sent");
                self.dispatch = None;
            }
        }

        // no subscribers is fine
        let _ = self.results.send(result.clone());
    }

    fn skip(&mut self, reason: SkipReason, now: Instant) {
        let report = self
            .last_skip_report
            .map(|last| now.saturating_duration_since(last) >= self.classify_interval)
            .unwrap_or(true);
        if report {
            self.last_skip_report = Some(now);
            self.stats.skipped_ticks += 1;
            tracing::debug!("[Pipeline] Tick skipped: {:?}", reason);
            self.telemetry.record_tick_skipped(reason);
        }
    }

    fn report_link_drops(&mut self) {
        let dropped = self.link.stats().dropped;
        if dropped > self.reported_dropped {
            tracing::warn!(
                "[Pipeline] {} samples dropped before ingestion",
                dropped - self.reported_dropped
            );
            self.reported_dropped = dropped;
            self.telemetry.record_samples_dropped(dropped);
        }
    }
}

/// Run `driver` on its own thread
pub fn spawn_pipeline_thread<L>(driver: PipelineDriver<L>) -> JoinHandle<DriverStats>
where
    L: SampleLink + 'static,
{
    thread::spawn(move || driver.run())
}

#[cfg(test)]
mod tests;
