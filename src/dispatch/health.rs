// HealthTracker - connection health state machine for the result sink
//
// Every dispatch attempt is fed in exactly once as Ack or Fail:
// - Ack resets the failure counter, returns to Connected and stamps the
//   last success time
// - Fail increments the counter; reaching `lost_after` means Lost, reaching
//   `degraded_after` with no success for longer than the disconnect
//   threshold means Degraded, anything else keeps the current state
//
// The tracker starts Connected with "last success" set to its creation time.

use crate::config::DispatchConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Sink reachability as seen from the dispatch side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHealth {
    Connected,
    Degraded,
    Lost,
}

impl ConnectionHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionHealth::Connected => "connected",
            ConnectionHealth::Degraded => "degraded",
            ConnectionHealth::Lost => "lost",
        }
    }
}

impl fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub degraded_after: u32,
    pub lost_after: u32,
    pub disconnect_threshold: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            degraded_after: 3,
            lost_after: 5,
            disconnect_threshold: Duration::from_secs(3),
        }
    }
}

impl From<&DispatchConfig> for HealthPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            degraded_after: config.degraded_after_failures,
            lost_after: config.lost_after_failures,
            disconnect_threshold: config.disconnect_threshold(),
        }
    }
}

/// A state change produced by one recorded outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthTransition {
    pub from: ConnectionHealth,
    pub to: ConnectionHealth,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    policy: HealthPolicy,
    state: ConnectionHealth,
    consecutive_failures: u32,
    last_success: Instant,
}

impl HealthTracker {
    /// # Arguments
    /// * `policy` - failure thresholds
    /// * `now` - creation time, used as the initial last success
    pub fn new(policy: HealthPolicy, now: Instant) -> Self {
        Self {
            policy,
            state: ConnectionHealth::Connected,
            consecutive_failures: 0,
            last_success: now,
        }
    }

    pub fn state(&self) -> ConnectionHealth {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success(&self) -> Instant {
        self.last_success
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Record a successful dispatch
    ///
    /// # Returns
    /// The transition, if the state changed
    pub fn record_ack(&mut self, now: Instant) -> Option<HealthTransition> {
        self.consecutive_failures = 0;
        self.last_success = now;
        self.transition_to(ConnectionHealth::Connected)
    }

    /// Record a failed dispatch
    ///
    /// # Returns
    /// The transition, if the state changed
    pub fn record_failure(&mut self, now: Instant) -> Option<HealthTransition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let silent_for = now.saturating_duration_since(self.last_success);
        let next = if self.consecutive_failures >= self.policy.lost_after {
            ConnectionHealth::Lost
        } else if self.consecutive_failures >= self.policy.degraded_after
            && silent_for > self.policy.disconnect_threshold
        {
            ConnectionHealth::Degraded
        } else {
            self.state
        };
        self.transition_to(next)
    }

    fn transition_to(&mut self, next: ConnectionHealth) -> Option<HealthTransition> {
        if next == self.state {
            return None;
        }
        let transition = HealthTransition {
            from: self.state,
            to: next,
            consecutive_failures: self.consecutive_failures,
        };
        self.state = next;
        Some(transition)
    }
}
