// Dispatch - deliver results to the sink and track its health
//
// One attempt per result, bounded by an explicit timeout, no inline retries.
// Every outcome (including a timeout or a superseded attempt) is fed to the
// health tracker by the worker.

pub mod health;
pub mod sink;
pub mod worker;

pub use health::{ConnectionHealth, HealthPolicy, HealthTracker, HealthTransition};
pub use sink::{HttpSink, ResultSink, SinkPayload, TREMOR_ENDPOINT};
pub use worker::{spawn_dispatch_worker, DispatchHandle, DispatchStats, DispatchSubmitter};

use crate::analysis::ClassificationResult;
use crate::config::DispatchConfig;
use crate::error::SinkError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why an attempt did not count as delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchFailure {
    /// Sink answered with a non-2xx status
    Status { code: u16 },
    /// No response (connection refused, reset, bad response)
    Transport { reason: String },
    /// No response within the dispatch timeout
    Timeout,
    /// Abandoned because a newer result arrived
    Superseded,
}

impl DispatchFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchFailure::Status { code } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Status { code } => write!(f, "HTTP {}", code),
            DispatchFailure::Transport { reason } => write!(f, "transport error: {}", reason),
            DispatchFailure::Timeout => f.write_str("timed out"),
            DispatchFailure::Superseded => f.write_str("superseded by a newer result"),
        }
    }
}

/// Result of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ack { status: u16 },
    Fail(DispatchFailure),
}

impl DispatchOutcome {
    pub fn is_ack(&self) -> bool {
        matches!(self, DispatchOutcome::Ack { .. })
    }

    fn from_response(response: Result<u16, SinkError>) -> Self {
        match response {
            Ok(status) if (200..300).contains(&status) => DispatchOutcome::Ack { status },
            Ok(code) => DispatchOutcome::Fail(DispatchFailure::Status { code }),
            Err(SinkError::TimedOut) => DispatchOutcome::Fail(DispatchFailure::Timeout),
            Err(SinkError::Transport { reason }) => {
                DispatchOutcome::Fail(DispatchFailure::Transport { reason })
            }
            Err(other) => DispatchOutcome::Fail(DispatchFailure::Transport {
                reason: other.to_string(),
            }),
        }
    }
}

/// Turns results into single sink attempts
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn ResultSink>,
    device_id: String,
    data_type: String,
    timeout: Duration,
}

impl Dispatcher {
    /// # Arguments
    /// * `sink` - destination for payloads
    /// * `device_id` - value of the payload `deviceId` field
    /// * `config` - timeout and `dataType`
    pub fn new(sink: Arc<dyn ResultSink>, device_id: impl Into<String>, config: &DispatchConfig) -> Self {
        Self {
            sink,
            device_id: device_id.into(),
            data_type: config.data_type.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start one attempt for `result`
    ///
    /// The returned future owns everything it needs, so it can be dropped
    /// mid-flight to abandon the request.
    pub fn attempt(&self, result: &ClassificationResult) -> BoxFuture<'static, DispatchOutcome> {
        let payload = SinkPayload::from_result(result, &self.device_id, &self.data_type);
        let send = self.sink.send(payload);
        let timeout = self.timeout;
        async move {
            match tokio::time::timeout(timeout, send).await {
                Ok(response) => DispatchOutcome::from_response(response),
                Err(_) => DispatchOutcome::Fail(DispatchFailure::Timeout),
            }
        }
        .boxed()
    }

    /// Deliver `result` once
    pub async fn dispatch(&self, result: &ClassificationResult) -> DispatchOutcome {
        self.attempt(result).await
    }
}
