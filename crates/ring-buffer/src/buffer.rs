//! Ring Buffer Implementation

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default window capacity (10 samples = ~330ms at 30fps)
pub const DEFAULT_CAPACITY: usize = 10;

/// FIFO window of the most recent `capacity` samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    /// Samples, oldest at the front
    samples: VecDeque<T>,
    /// Maximum number of retained samples
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new window holding at most `capacity` samples.
    ///
    /// A capacity of zero is bumped to one so the window always holds
    /// the newest sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, evicting and returning the oldest one if full
    pub fn push(&mut self, sample: T) -> Option<T> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Iterate over the last `count` samples, oldest first
    pub fn last_n(&self, count: usize) -> impl Iterator<Item = &T> {
        let skip = self.samples.len().saturating_sub(count);
        self.samples.iter().skip(skip)
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl RingBuffer<f32> {
    /// Arithmetic mean of the window, `None` when empty
    pub fn mean(&self) -> Option<f32> {
        mean_of(self.samples.iter().copied())
    }
}

fn mean_of(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}
