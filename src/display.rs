// DisplayBuffer - bounded store of recent results for a live view
//
// Rendering is left to the consumer. The buffer only keeps the newest
// results and forgets all of them when the sink connection is lost, so a
// view never shows stale data as if it were live.

use crate::analysis::ClassificationResult;
use crate::dispatch::ConnectionHealth;
use std::collections::VecDeque;

/// Default number of results kept
pub const DEFAULT_DISPLAY_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct DisplayBuffer {
    results: VecDeque<ClassificationResult>,
    capacity: usize,
    health: ConnectionHealth,
}

impl DisplayBuffer {
    /// # Panics
    /// Panics if capacity is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            results: VecDeque::with_capacity(capacity),
            capacity,
            health: ConnectionHealth::Connected,
        }
    }

    pub fn push(&mut self, result: ClassificationResult) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    /// Apply a health update
    ///
    /// # Returns
    /// true if the buffer was cleared
    pub fn observe_health(&mut self, health: ConnectionHealth) -> bool {
        self.health = health;
        if health == ConnectionHealth::Lost && !self.results.is_empty() {
            tracing::info!(
                "[Display] Connection lost, clearing {} results",
                self.results.len()
            );
            self.results.clear();
            return true;
        }
        false
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    pub fn latest(&self) -> Option<&ClassificationResult> {
        self.results.back()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.results.iter()
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_CAPACITY)
    }
}
