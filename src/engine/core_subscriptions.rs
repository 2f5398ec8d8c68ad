use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::PipelineHandle;
use crate::analysis::ClassificationResult;
use crate::dispatch::ConnectionHealth;
use crate::telemetry::{MetricEvent, TelemetryHub, TelemetrySnapshot};

impl PipelineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Every classification produced after this call
    pub fn subscribe_results(&self) -> broadcast::Receiver<ClassificationResult> {
        self.results.subscribe()
    }

    /// Sink health, updated on every transition
    ///
    /// Stays `Connected` when no sink is configured.
    pub fn subscribe_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.clone()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<MetricEvent> {
        self.telemetry.subscribe()
    }

    // ========================================================================
    // CURRENT STATE
    // ========================================================================

    pub fn health(&self) -> ConnectionHealth {
        *self.health.borrow()
    }

    pub fn telemetry(&self) -> &TelemetryHub {
        &self.telemetry
    }

    /// Shared hub, for consumers that outlive a borrow of the handle
    pub fn telemetry_hub(&self) -> Arc<TelemetryHub> {
        Arc::clone(&self.telemetry)
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }
}
