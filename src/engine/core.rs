//! PipelineBuilder / PipelineHandle: reusable pipeline orchestration layer.
//!
//! The builder validates configuration and constructs every stage before any
//! thread or task starts, so configuration errors surface to the caller and
//! never from inside the loop. The handle exposes the stop flag, result and
//! health subscriptions, and the per-pipeline telemetry hub.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::analysis::{
    spawn_pipeline_thread, ClassificationEngine, ClassificationResult, DriverStats,
    FeatureExtractor, PipelineDriver, StopFlag, TrainedModel, RESULT_CHANNEL_CAPACITY,
};
use crate::config::PipelineConfig;
use crate::dispatch::{
    spawn_dispatch_worker, ConnectionHealth, DispatchHandle, DispatchStats, Dispatcher,
    HealthPolicy, HttpSink, ResultSink,
};
use crate::engine::clock::{SystemTimeSource, TimeSource};
use crate::error::{log_config_error, ConfigError};
use crate::signal::{spawn_reader, LinkStats, ReaderHandle, SampleLink};
use crate::telemetry::{TelemetryHub, TelemetrySnapshot};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// How long `join` waits for a reader thread blocked in a read
const READER_JOIN_GRACE: Duration = Duration::from_millis(200);

/// Final state of a pipeline after `PipelineHandle::join`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// None if the driver thread panicked
    pub driver: Option<DriverStats>,
    /// None when no sink was configured
    pub dispatch: Option<DispatchStats>,
    /// Stats of a threaded reader, if it exited in time
    pub reader: Option<LinkStats>,
    pub health: ConnectionHealth,
    pub telemetry: TelemetrySnapshot,
}

/// Stages built and validated, not yet running
struct Prepared {
    config: PipelineConfig,
    extractor: FeatureExtractor,
    engine: ClassificationEngine,
    sink: Option<Arc<dyn ResultSink>>,
    clock: Arc<dyn TimeSource>,
    telemetry: Arc<TelemetryHub>,
}

/// Assembles a pipeline from configuration and optional collaborators.
pub struct PipelineBuilder {
    config: PipelineConfig,
    classifier: Option<TrainedModel>,
    sink: Option<Arc<dyn ResultSink>>,
    clock: Arc<dyn TimeSource>,
    telemetry: Option<Arc<TelemetryHub>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            classifier: None,
            sink: None,
            clock: Arc::new(SystemTimeSource),
            telemetry: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Trained classifier consulted below the model threshold
    pub fn classifier(mut self, model: TrainedModel) -> Self {
        self.classifier = Some(model);
        self
    }

    /// Result sink; overrides `dispatch.sink_url` from the configuration
    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<TelemetryHub>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Validate configuration and build the extraction and classification
    /// stages without starting anything
    pub fn build_stages(&mut self) -> Result<(FeatureExtractor, ClassificationEngine), ConfigError> {
        self.config.validate()?;
        let extractor = FeatureExtractor::new(self.config.sampling.sample_rate_hz, &self.config.features)?;
        let names = extractor.feature_names();
        let engine = ClassificationEngine::new(
            self.config.heuristic.clone(),
            &names,
            self.classifier.take(),
        )?;
        Ok((extractor, engine))
    }

    fn resolve_sink(&self) -> Result<Option<Arc<dyn ResultSink>>, ConfigError> {
        if let Some(sink) = &self.sink {
            return Ok(Some(Arc::clone(sink)));
        }
        let Some(url) = self.config.dispatch.sink_url.as_deref() else {
            return Ok(None);
        };
        let sink = HttpSink::new(url, self.config.dispatch.timeout()).map_err(|err| {
            ConfigError::InvalidDispatch {
                reason: err.to_string(),
            }
        })?;
        Ok(Some(Arc::new(sink)))
    }

    fn prepare(mut self) -> Result<Prepared, ConfigError> {
        let result = self.build_stages().and_then(|(extractor, engine)| {
            let sink = self.resolve_sink()?;
            Ok((extractor, engine, sink))
        });
        let (extractor, engine, sink) = match result {
            Ok(stages) => stages,
            Err(err) => {
                log_config_error(&err, "PipelineBuilder::prepare");
                return Err(err);
            }
        };

        Ok(Prepared {
            config: self.config,
            extractor,
            engine,
            sink,
            clock: self.clock,
            telemetry: self.telemetry.unwrap_or_default(),
        })
    }

    /// Start the driver thread reading directly from `link`
    ///
    /// # Arguments
    /// * `link` - open, non-blocking (or short-timeout) sample link
    /// * `runtime` - runtime hosting the dispatch task
    pub fn spawn<L>(self, link: L, runtime: &tokio::runtime::Handle) -> Result<PipelineHandle, ConfigError>
    where
        L: SampleLink + 'static,
    {
        let prepared = self.prepare()?;
        Ok(launch(prepared, link, None, runtime))
    }

    /// Like `spawn`, with `link` moved onto a reader thread behind a bounded
    /// queue of `sampling.reader_queue_capacity` samples
    pub fn spawn_threaded<L>(
        self,
        link: L,
        runtime: &tokio::runtime::Handle,
    ) -> Result<PipelineHandle, ConfigError>
    where
        L: SampleLink + 'static,
    {
        let prepared = self.prepare()?;
        let (queued, reader) = spawn_reader(link, prepared.config.sampling.reader_queue_capacity);
        Ok(launch(prepared, queued, Some(reader), runtime))
    }
}

fn launch<L>(
    prepared: Prepared,
    link: L,
    reader: Option<ReaderHandle>,
    runtime: &tokio::runtime::Handle,
) -> PipelineHandle
where
    L: SampleLink + 'static,
{
    let Prepared {
        config,
        extractor,
        engine,
        sink,
        clock,
        telemetry,
    } = prepared;

    let stop = StopFlag::new();
    let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
    let mut driver = PipelineDriver::new(link, &config, extractor, engine, Arc::clone(&clock))
        .with_results(results.clone())
        .with_telemetry(Arc::clone(&telemetry))
        .with_stop_flag(stop.clone());

    let (dispatch, health, idle_health) = match sink {
        Some(sink) => {
            let dispatcher = Dispatcher::new(sink, config.device_id.clone(), &config.dispatch);
            let (submitter, handle) = spawn_dispatch_worker(
                dispatcher,
                HealthPolicy::from(&config.dispatch),
                clock,
                Arc::clone(&telemetry),
                runtime,
            );
            driver = driver.with_dispatch(submitter);
            let health = handle.subscribe_health();
            (Some(handle), health, None)
        }
        None => {
            tracing::info!("[Pipeline] No sink configured, results stay local");
            let (tx, rx) = watch::channel(ConnectionHealth::Connected);
            (None, rx, Some(tx))
        }
    };

    tracing::info!(
        "[Pipeline] Starting for device {} ({} Hz, window {})",
        config.device_id,
        config.sampling.sample_rate_hz,
        config.sampling.window_size
    );

    PipelineHandle {
        stop,
        results,
        telemetry,
        driver: spawn_pipeline_thread(driver),
        reader,
        dispatch,
        health,
        _idle_health: idle_health,
    }
}

/// Control surface of a running pipeline
pub struct PipelineHandle {
    stop: StopFlag,
    results: broadcast::Sender<ClassificationResult>,
    telemetry: Arc<TelemetryHub>,
    driver: JoinHandle<DriverStats>,
    reader: Option<ReaderHandle>,
    dispatch: Option<DispatchHandle>,
    health: watch::Receiver<ConnectionHealth>,
    // keeps `health` open when there is no dispatch task
    _idle_health: Option<watch::Sender<ConnectionHealth>>,
}

impl PipelineHandle {
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Ask the driver to exit after its current cycle
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }

    pub fn has_dispatch(&self) -> bool {
        self.dispatch.is_some()
    }

    /// Wait for the driver to exit, then for the dispatch task and reader
    ///
    /// Does not stop the pipeline; call `stop` first, or rely on the maximum
    /// run time or an exhausted source.
    pub async fn join(self) -> PipelineReport {
        let PipelineHandle {
            driver,
            reader,
            dispatch,
            health,
            telemetry,
            ..
        } = self;

        let driver = match tokio::task::spawn_blocking(move || driver.join()).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(_)) => {
                tracing::error!("[Pipeline] Driver thread panicked");
                None
            }
            Err(err) => {
                tracing::error!("[Pipeline] Failed to join driver thread: {}", err);
                None
            }
        };

        // the driver dropped its submitter on exit, so the task winds down
        let dispatch = match dispatch {
            Some(handle) => handle.join().await,
            None => None,
        };

        let reader = match reader {
            Some(reader) => tokio::task::spawn_blocking(move || join_reader(reader))
                .await
                .ok()
                .flatten(),
            None => None,
        };

        let health = *health.borrow();
        PipelineReport {
            driver,
            dispatch,
            reader,
            health,
            telemetry: telemetry.snapshot(),
        }
    }
}

fn join_reader(reader: ReaderHandle) -> Option<LinkStats> {
    reader.stop();
    let deadline = Instant::now() + READER_JOIN_GRACE;
    while !reader.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if reader.is_finished() {
        reader.join()
    } else {
        tracing::debug!("[Pipeline] Reader still blocked in a read, detaching");
        None
    }
}

#[cfg(test)]
mod tests;
