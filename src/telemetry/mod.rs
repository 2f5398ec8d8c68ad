//! Per-pipeline telemetry collector and helpers.
//!
//! The collector multiplexes classification, dispatch, health and buffer
//! events into a bounded history plus a broadcast stream. Each pipeline owns
//! its own hub.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::analysis::ClassificationResult;
use crate::dispatch::{ConnectionHealth, DispatchOutcome};

pub mod events;

pub use events::{MetricEvent, SkipReason};

/// Snapshot of collector state for HTTP/CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window of dispatch round-trip times.
struct LatencyTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn observe(&mut self, value: f32) -> (f32, f32, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value.abs());

        let count = self.samples.len();
        let sum: f32 = self.samples.iter().copied().sum();
        let max = self
            .samples
            .iter()
            .copied()
            .fold(0.0_f32, |acc, next| acc.max(next));
        (sum / count as f32, max, count)
    }
}

/// Pipeline hub wrapping collector state plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    latency: Mutex<LatencyTracker>,
    buffer_gauges: Mutex<HashMap<&'static str, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            latency: Mutex::new(LatencyTracker::new(latency_window.max(1))),
            buffer_gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.collector.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_classification(&self, result: &ClassificationResult) {
        self.collector.publish(MetricEvent::Classification {
            label: result.label,
            confidence: result.confidence,
            tier: result.tier,
            low_confidence: result.low_confidence,
        });
    }

    pub fn record_tick_skipped(&self, reason: SkipReason) {
        self.collector.publish(MetricEvent::TickSkipped { reason });
    }

    pub fn record_dispatch(&self, outcome: &DispatchOutcome, latency: Duration) {
        let latency_ms = latency.as_secs_f32() * 1000.0;
        let (ack, status, failure) = match outcome {
            DispatchOutcome::Ack { status } => (true, Some(*status), None),
            DispatchOutcome::Fail(failure) => (false, failure.status(), Some(failure.clone())),
        };
        self.collector.publish(MetricEvent::Dispatch {
            ack,
            status,
            failure,
            latency_ms,
        });

        let (avg, max, count) = {
            let mut tracker = self.latency.lock().unwrap_or_else(PoisonError::into_inner);
            tracker.observe(latency_ms)
        };
        self.collector.publish(MetricEvent::DispatchLatency {
            avg_ms: avg,
            max_ms: max,
            sample_count: count,
        });
    }

    pub fn record_health(&self, from: ConnectionHealth, to: ConnectionHealth, failures: u32) {
        self.collector.publish(MetricEvent::HealthChanged {
            from,
            to,
            consecutive_failures: failures,
        });
    }

    /// Publish an occupancy gauge, skipping changes under 2.5 points
    pub fn record_buffer_occupancy(&self, channel: &'static str, percent: f32) {
        let normalized = percent.clamp(0.0, 100.0);
        let mut gauges = self
            .buffer_gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let should_emit = gauges
            .get(channel)
            .map(|last| (last - normalized).abs() >= 2.5)
            .unwrap_or(true);

        if should_emit {
            gauges.insert(channel, normalized);
            self.collector.publish(MetricEvent::BufferOccupancy {
                channel: channel.to_string(),
                percent: normalized,
            });
        }
    }

    pub fn record_samples_dropped(&self, count: u64) {
        self.collector.publish(MetricEvent::SamplesDropped { count });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DecisionTier, Severity};
    use crate::dispatch::DispatchFailure;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(MetricEvent::SamplesDropped { count: 1 });
        collector.publish(MetricEvent::TickSkipped {
            reason: SkipReason::Buffering {
                buffered: 10,
                required: 500,
            },
        });
        collector.publish(MetricEvent::BufferOccupancy {
            channel: "test".to_string(),
            percent: 50.0,
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(snapshot.recent[0], MetricEvent::SamplesDropped { count: 1 });
        assert!(matches!(
            snapshot.recent[2],
            MetricEvent::BufferOccupancy { .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        for count in 1..=3 {
            collector.publish(MetricEvent::SamplesDropped { count });
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.recent[0], MetricEvent::SamplesDropped { count: 2 });
    }

    #[test]
    fn hub_tracks_dispatch_latency() {
        let hub = TelemetryHub::new(16, 16, 4);
        hub.record_dispatch(&DispatchOutcome::Ack { status: 200 }, Duration::from_millis(10));
        hub.record_dispatch(
            &DispatchOutcome::Fail(DispatchFailure::Status { code: 500 }),
            Duration::from_millis(30),
        );

        let snapshot = hub.snapshot();
        assert!(snapshot.recent.iter().any(|event| matches!(
            event,
            MetricEvent::Dispatch {
                ack: false,
                status: Some(500),
                ..
            }
        )));
        let last = snapshot.recent.last().unwrap();
        match last {
            MetricEvent::DispatchLatency {
                avg_ms,
                max_ms,
                sample_count,
            } => {
                assert_eq!(*sample_count, 2);
                assert!((avg_ms - 20.0).abs() < 0.01);
                assert!((max_ms - 30.0).abs() < 0.01);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn buffer_gauge_debounces_small_changes() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_buffer_occupancy("ring_buffer", 10.0);
        hub.record_buffer_occupancy("ring_buffer", 10.5);
        hub.record_buffer_occupancy("ring_buffer", 25.0);

        let gauges = hub
            .snapshot()
            .recent
            .iter()
            .filter(|event| matches!(event, MetricEvent::BufferOccupancy { .. }))
            .count();
        assert_eq!(gauges, 2);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = MetricEvent::Classification {
            label: Severity::Severe,
            confidence: 0.7,
            tier: DecisionTier::Heuristic,
            low_confidence: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "classification");
        assert_eq!(json["payload"]["label"], "severe");
        assert_eq!(json["payload"]["tier"], "heuristic");
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = TelemetryHub::default();
        let mut rx = hub.subscribe();
        hub.record_health(ConnectionHealth::Connected, ConnectionHealth::Degraded, 3);
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            MetricEvent::HealthChanged {
                from: ConnectionHealth::Connected,
                to: ConnectionHealth::Degraded,
                consecutive_failures: 3
            }
        );
    }
}
