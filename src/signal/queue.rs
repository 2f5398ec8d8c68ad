// Reader thread - decouples blocking links from the pipeline loop
//
// Architecture:
// - Reader thread: owns the real link, pushes samples into an rtrb SPSC queue
// - QueuedLink: consumer side, a non-blocking SampleLink for the driver
//
// When the queue is full the newest sample is dropped and counted; the
// reader never waits on the pipeline.

use super::source::{LinkStats, SampleLink};
use super::Sample;
use rtrb::{Consumer, PopError, RingBuffer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default capacity of the reader queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Consumer side of a reader thread
pub struct QueuedLink {
    consumer: Consumer<Sample>,
    dropped: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    received: u64,
}

impl SampleLink for QueuedLink {
    fn read_sample(&mut self) -> Option<Sample> {
        match self.consumer.pop() {
            Ok(sample) => {
                self.received += 1;
                Some(sample)
            }
            Err(PopError::Empty) => None,
        }
    }

    fn stats(&self) -> LinkStats {
        LinkStats {
            samples: self.received,
            dropped: self.dropped.load(Ordering::Relaxed),
            ..LinkStats::default()
        }
    }

    /// Reader thread has exited and every queued sample was consumed
    fn is_exhausted(&self) -> bool {
        self.finished.load(Ordering::SeqCst) && self.consumer.is_empty()
    }
}

/// Control handle for a reader thread
pub struct ReaderHandle {
    shutdown_flag: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    thread: Option<JoinHandle<LinkStats>>,
}

impl ReaderHandle {
    /// Ask the reader to exit after its current read
    pub fn stop(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the reader and wait for it, returning the link's final stats
    ///
    /// Blocks for as long as the underlying link blocks in one read.
    pub fn join(mut self) -> Option<LinkStats> {
        self.stop();
        self.thread.take().and_then(|t| t.join().ok())
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
    }
}

/// Move `link` onto its own thread behind a bounded queue
///
/// # Panics
/// Panics if capacity is 0
pub fn spawn_reader<L>(mut link: L, capacity: usize) -> (QueuedLink, ReaderHandle)
where
    L: SampleLink + 'static,
{
    assert!(capacity > 0, "capacity must be greater than 0");

    let (mut producer, consumer) = RingBuffer::new(capacity);
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let thread = {
        let shutdown_flag = Arc::clone(&shutdown_flag);
        let dropped = Arc::clone(&dropped);
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            tracing::info!("[Source] Reader thread started (queue capacity {})", capacity);
            while !shutdown_flag.load(Ordering::SeqCst) {
                match link.read_sample() {
                    Some(sample) => {
                        if producer.push(sample).is_err() {
                            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            if total.is_power_of_two() {
                                tracing::warn!("[Source] Reader queue full, {} samples dropped", total);
                            }
                        }
                    }
                    None => {
                        if producer.is_abandoned() || link.is_exhausted() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
            let stats = link.stats();
            tracing::info!("[Source] Reader thread exiting ({} samples read)", stats.samples);
            finished.store(true, Ordering::SeqCst);
            stats
        })
    };

    (
        QueuedLink {
            consumer,
            dropped: Arc::clone(&dropped),
            finished,
            received: 0,
        },
        ReaderHandle {
            shutdown_flag,
            dropped,
            thread: Some(thread),
        },
    )
}
