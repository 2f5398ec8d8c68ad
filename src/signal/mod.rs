// Signal module - sample acquisition and windowing
//
// - buffer: bounded history of filtered values (RingBuffer)
// - source: link traits, line-protocol parser, TCP/stdin/file connectors
// - synthetic: deterministic tremor-like generator for tests and demos
// - queue: optional reader thread feeding the pipeline through rtrb

pub mod buffer;
pub mod queue;
pub mod source;
pub mod synthetic;

pub use buffer::RingBuffer;
pub use queue::{spawn_reader, QueuedLink, ReaderHandle};
pub use source::{
    parse_line, LineLink, LinkStats, ReaderConnector, SampleConnector, SampleLink, TcpConnector,
};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use std::time::Instant;

/// One reading from the acquisition device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unprocessed ADC value
    pub raw: f64,
    /// Device-side band-passed value; the only channel the pipeline analyses
    pub filtered: f64,
    pub captured_at: Instant,
}

impl Sample {
    pub fn new(raw: f64, filtered: f64, captured_at: Instant) -> Self {
        Self {
            raw,
            filtered,
            captured_at,
        }
    }

    /// Sample stamped with the current instant
    pub fn now(raw: f64, filtered: f64) -> Self {
        Self::new(raw, filtered, Instant::now())
    }
}
