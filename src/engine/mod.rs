//! Engine module housing pipeline orchestration.
//!
//! `clock` provides the time sources shared by the driver cadence and the
//! health tracker; `core` wires configuration, source, classifier and sink
//! into a running pipeline.

pub mod clock;
pub mod core;

pub use clock::{now_timestamp_ms, ManualTimeSource, SystemTimeSource, TimeSource};
pub use self::core::{PipelineBuilder, PipelineHandle, PipelineReport};
