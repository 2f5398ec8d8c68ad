//! Telemetry event types exposed to the CLI summary and the debug HTTP
//! surface.

use serde::{Deserialize, Serialize};

use crate::analysis::{DecisionTier, Severity};
use crate::dispatch::{ConnectionHealth, DispatchFailure};

/// Why a classification tick produced no result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Ring buffer holds fewer samples than the window size
    Buffering { buffered: usize, required: usize },
    /// Extractor rejected the window as too short
    InsufficientData { available: usize, required: usize },
}

/// Metric events covering classification, dispatch and buffer health.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Classification {
        label: Severity,
        confidence: f64,
        tier: DecisionTier,
        low_confidence: bool,
    },
    TickSkipped {
        reason: SkipReason,
    },
    Dispatch {
        ack: bool,
        status: Option<u16>,
        failure: Option<DispatchFailure>,
        latency_ms: f32,
    },
    DispatchLatency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    HealthChanged {
        from: ConnectionHealth,
        to: ConnectionHealth,
        consecutive_failures: u32,
    },
    BufferOccupancy {
        channel: String,
        percent: f32,
    },
    /// Cumulative samples lost between reader and pipeline
    SamplesDropped {
        count: u64,
    },
}
