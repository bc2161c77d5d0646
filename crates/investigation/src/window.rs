//! Rolling baseline of social complaint rate

use std::collections::VecDeque;

/// Fixed-capacity window of recent per-cycle complaint rates
#[derive(Debug, Clone)]
pub(crate) struct SlidingWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, item: f64) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Mean of the recorded rates, `None` until the first sample
    pub(crate) fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().sum::<f64>() / self.data.len() as f64)
    }
}
