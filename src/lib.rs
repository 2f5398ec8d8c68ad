// Tremor Monitor Core - real-time EMG tremor classification
// Windowed feature extraction, two-tier classification and health-tracked dispatch

// Module declarations
pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod engine;
pub mod error;
#[cfg(feature = "debug_http")]
pub mod http;
pub mod signal;
pub mod telemetry;

// Re-exports for convenience
pub use analysis::{
    ClassificationEngine, ClassificationResult, DecisionTier, FeatureExtractor, FeatureVector,
    PipelineDriver, Severity, StopFlag, TickOutcome, TrainedModel,
};
pub use config::PipelineConfig;
pub use dispatch::{ConnectionHealth, HttpSink, ResultSink};
pub use display::DisplayBuffer;
pub use engine::{PipelineBuilder, PipelineHandle, PipelineReport};
