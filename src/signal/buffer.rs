// RingBuffer - bounded history of filtered sample values
//
// Owned by the pipeline loop; no internal synchronisation.

use std::collections::VecDeque;

/// Fixed-capacity FIFO that evicts the oldest value on overflow
#[derive(Debug, Clone)]
pub struct RingBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a ring buffer holding at most `capacity` values
    ///
    /// # Panics
    /// Panics if capacity is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// The last `n` values in arrival order, or all of them if fewer exist
    pub fn snapshot(&self, n: usize) -> Vec<f64> {
        let skip = self.values.len().saturating_sub(n);
        self.values.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level in percent
    pub fn occupancy(&self) -> f32 {
        self.values.len() as f32 / self.capacity as f32 * 100.0
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_returns_latest_in_order() {
        let mut ring = RingBuffer::new(5);
        for i in 0..3 {
            ring.push(i as f64);
        }
        assert_eq!(ring.snapshot(2), vec![1.0, 2.0]);
        assert_eq!(ring.snapshot(10), vec![0.0, 1.0, 2.0]);
        assert_eq!(ring.snapshot(0), Vec::<f64>::new());
    }

    #[test]
    fn test_overflow_keeps_last_capacity_values() {
        let capacity = 1000;
        let extra = 37;
        let mut ring = RingBuffer::new(capacity);
        for i in 0..capacity + extra {
            ring.push(i as f64);
            assert!(ring.len() <= capacity);
        }
        assert_eq!(ring.len(), capacity);
        let expected: Vec<f64> = (extra..capacity + extra).map(|i| i as f64).collect();
        assert_eq!(ring.snapshot(capacity), expected);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut ring = RingBuffer::new(4);
        ring.push(1.0);
        ring.push(2.0);
        let _ = ring.snapshot(2);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.occupancy(), 50.0);
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        RingBuffer::new(0);
    }
}
