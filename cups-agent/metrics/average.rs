// Rolling mean over a fixed number of samples

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct AverageCounter {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl AverageCounter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Mean of the buffered samples, NaN when empty
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return f64::NAN;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Drop all samples and resize
    pub fn reset(&mut self, capacity: usize) {
        *self = Self::new(capacity);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
