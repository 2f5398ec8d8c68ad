// Clock abstraction shared by the driver cadence and the health tracker

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic time source
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;

    /// Wall-clock epoch milliseconds stamped on results
    fn timestamp_ms(&self) -> u64 {
        now_timestamp_ms()
    }
}

/// Default time source backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time source that only moves when told to
///
/// Clones share the same offset, so a test can keep one handle and advance
/// the clock seen by a pipeline it no longer owns.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    start: Instant,
    start_ms: u64,
    offset_us: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::starting_at_ms(now_timestamp_ms())
    }

    /// Manual clock whose timestamps begin at `epoch_ms`
    pub fn starting_at_ms(epoch_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            start_ms: epoch_ms,
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_us
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::SeqCst))
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn timestamp_ms(&self) -> u64 {
        self.start_ms + self.elapsed().as_millis() as u64
    }
}

/// Wall-clock milliseconds since the Unix epoch
pub fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
