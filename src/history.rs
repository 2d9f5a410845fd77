//! Rolling trend history.
//!
//! This module provides `TrendBuffer`, a bounded FIFO of accepted glucose
//! observations. Each observation pairs a coarse elapsed-time label with the
//! predicted value; the label and value sequences are parallel and equal in
//! length at every observable instant.
//!
//! The buffer is mutated only by the sampling scheduler, from a single logical
//! thread of control, so it carries no locking of its own.

use std::collections::VecDeque;

/// One accepted glucose observation.
///
/// Immutable once created; destroyed only by FIFO eviction from `TrendBuffer`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Elapsed time since the session started, in whole seconds (e.g., "12s").
    pub label: String,
    /// Predicted glucose value in mg/dL.
    pub value: f64,
}

impl Sample {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Bounded ring buffer for the rolling trend.
///
/// Insertion order is chronological order. On insertion at capacity, the
/// oldest sample is evicted. Samples with identical labels are kept as
/// distinct entries; the buffer never deduplicates by label.
pub struct TrendBuffer {
    buffer: VecDeque<Sample>,
    capacity: usize,
}

impl TrendBuffer {
    /// Create a buffer holding at most `capacity` samples.
    ///
    /// A zero capacity is rejected upstream by config validation; it is
    /// clamped to 1 here so the type itself cannot be built degenerate.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest if the buffer is at capacity.
    pub fn append(&mut self, sample: Sample) {
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
    }

    /// Ordered copy of the current contents, oldest first.
    ///
    /// Calling this twice without an intervening append yields identical
    /// sequences.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.iter().cloned().collect()
    }

    /// Elapsed-time labels, oldest first. Parallel to `values()`.
    pub fn labels(&self) -> Vec<String> {
        self.buffer.iter().map(|s| s.label.clone()).collect()
    }

    /// Predicted values, oldest first. Parallel to `labels()`.
    pub fn values(&self) -> Vec<f64> {
        self.buffer.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
